//! File tools: read, list and edit files under the workspace.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{path, required_arg, Tool, ToolArgs, ToolError, ToolParam, ToolPayload};

/// Output of a successful read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOutput {
    pub file_path: String,
    pub content: String,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

/// Output of a successful listing, in directory order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOutput {
    pub path: String,
    pub files: Vec<FileEntry>,
}

/// What an edit did. Only `Edited` and `CreatedFile` touch the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditAction {
    #[serde(rename = "created_file")]
    CreatedFile,
    #[serde(rename = "file not found")]
    FileNotFound,
    #[serde(rename = "old_str not found")]
    OldStrNotFound,
    #[serde(rename = "edited")]
    Edited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutput {
    pub path: String,
    pub action: EditAction,
}

/// Read the full UTF-8 content of a file.
pub async fn read_file(full_path: &Path) -> Result<ReadOutput, ToolError> {
    let content = tokio::fs::read_to_string(full_path)
        .await
        .map_err(|e| ToolError::io(full_path, e))?;

    Ok(ReadOutput {
        file_path: full_path.display().to_string(),
        content,
    })
}

/// Whether `full_path` exists. A path running through a regular file
/// (`a.txt/x`) does not exist; other failures such as permission errors
/// are reported.
async fn path_exists(full_path: &Path) -> Result<bool, ToolError> {
    match tokio::fs::try_exists(full_path).await {
        Ok(exists) => Ok(exists),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(false),
        Err(e) => Err(ToolError::io(full_path, e)),
    }
}

/// List the entries of a directory.
pub async fn list_files(full_path: &Path) -> Result<ListOutput, ToolError> {
    if !path_exists(full_path).await? {
        return Err(ToolError::PathNotFound(full_path.display().to_string()));
    }

    let mut entries = tokio::fs::read_dir(full_path)
        .await
        .map_err(|e| ToolError::io(full_path, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ToolError::io(full_path, e))?
    {
        // Follows symlinks; anything that is not a regular file counts as a dir.
        let is_file = tokio::fs::metadata(entry.path())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);

        files.push(FileEntry {
            filename: entry.file_name().to_string_lossy().into_owned(),
            entry_type: if is_file {
                EntryType::File
            } else {
                EntryType::Dir
            },
        });
    }

    Ok(ListOutput {
        path: full_path.display().to_string(),
        files,
    })
}

/// Replace the first occurrence of `old_str` with `new_str`, or create/overwrite
/// the file with `new_str` when `old_str` is empty.
pub async fn edit_file(
    full_path: &Path,
    old_str: &str,
    new_str: &str,
) -> Result<EditOutput, ToolError> {
    let output = |action| EditOutput {
        path: full_path.display().to_string(),
        action,
    };

    if old_str.is_empty() {
        tokio::fs::write(full_path, new_str)
            .await
            .map_err(|e| ToolError::io(full_path, e))?;
        return Ok(output(EditAction::CreatedFile));
    }

    if !path_exists(full_path).await? {
        return Ok(output(EditAction::FileNotFound));
    }

    let original = tokio::fs::read_to_string(full_path)
        .await
        .map_err(|e| ToolError::io(full_path, e))?;
    if !original.contains(old_str) {
        return Ok(output(EditAction::OldStrNotFound));
    }

    let edited = original.replacen(old_str, new_str, 1);
    tokio::fs::write(full_path, edited)
        .await
        .map_err(|e| ToolError::io(full_path, e))?;

    Ok(output(EditAction::Edited))
}

async fn run_edit(args: &ToolArgs, workspace: &Path) -> Result<EditOutput, ToolError> {
    let target = required_arg(args, "path")?;
    let old_str = required_arg(args, "old_str")?;
    let new_str = required_arg(args, "new_str")?;
    edit_file(&path::resolve(workspace, target), old_str, new_str).await
}

const READ_PARAMS: &[ToolParam] = &[ToolParam {
    name: "filename",
    description: "Path of the file to read, relative to the workspace or absolute",
    required: true,
}];

const LIST_PARAMS: &[ToolParam] = &[ToolParam {
    name: "path",
    description: "Directory to list, relative to the workspace or absolute. Use \".\" for the workspace root",
    required: true,
}];

const EDIT_PARAMS: &[ToolParam] = &[
    ToolParam {
        name: "path",
        description: "Path of the file to edit, relative to the workspace or absolute",
        required: true,
    },
    ToolParam {
        name: "old_str",
        description: "Exact text to replace. Empty to create or overwrite the whole file",
        required: true,
    },
    ToolParam {
        name: "new_str",
        description: "Replacement text",
        required: true,
    },
];

/// Read a file's content.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Gets the full content of a file. Returns the absolute file path and its UTF-8 content."
    }

    fn parameters(&self) -> &[ToolParam] {
        READ_PARAMS
    }

    fn target_argument(&self) -> Option<&str> {
        Some("filename")
    }

    async fn execute(&self, args: &ToolArgs, workspace: &Path) -> ToolPayload {
        let result = match required_arg(args, "filename") {
            Ok(filename) => read_file(&path::resolve(workspace, filename)).await,
            Err(e) => Err(e),
        };
        ToolPayload::from_result(result)
    }
}

/// List a directory's entries.
pub struct ListFiles;

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "Lists the files in a directory. Each entry has a filename and a type of either \"file\" or \"dir\"."
    }

    fn parameters(&self) -> &[ToolParam] {
        LIST_PARAMS
    }

    fn target_argument(&self) -> Option<&str> {
        Some("path")
    }

    async fn execute(&self, args: &ToolArgs, workspace: &Path) -> ToolPayload {
        let result = match required_arg(args, "path") {
            Ok(dir) => list_files(&path::resolve(workspace, dir)).await,
            Err(e) => Err(e),
        };
        ToolPayload::from_result(result)
    }
}

/// Edit or create a file.
pub struct EditFile;

#[async_trait]
impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replaces the first occurrence of old_str with new_str in a file. If old_str is empty, creates or overwrites the file with new_str. Check the returned action: \"edited\", \"created_file\", \"file not found\" or \"old_str not found\"."
    }

    fn parameters(&self) -> &[ToolParam] {
        EDIT_PARAMS
    }

    fn target_argument(&self) -> Option<&str> {
        Some("path")
    }

    async fn execute(&self, args: &ToolArgs, workspace: &Path) -> ToolPayload {
        ToolPayload::from_result(run_edit(args, workspace).await)
    }
}
