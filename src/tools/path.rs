//! Path resolution for tool arguments.

use std::path::{Component, Path, PathBuf};

/// Resolve a user- or model-supplied path against the workspace.
///
/// A leading `~` expands to the home directory. Relative results are joined
/// to `workspace` and their `.`/`..` segments collapsed. Purely lexical: the
/// filesystem is never consulted, so the returned path need not exist.
pub fn resolve(workspace: &Path, path_str: &str) -> PathBuf {
    let expanded = expand_home(path_str);
    if expanded.is_absolute() {
        expanded
    } else {
        normalize(&workspace.join(expanded))
    }
}

/// Collapse `.` and `..` segments without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn expand_home(path_str: &str) -> PathBuf {
    let rest = if path_str == "~" {
        Some("")
    } else {
        path_str
            .strip_prefix("~/")
            .or_else(|| path_str.strip_prefix("~\\"))
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path_str),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_joins_workspace() {
        let resolved = resolve(Path::new("/work/project"), "src/main.rs");
        assert_eq!(resolved, PathBuf::from("/work/project/src/main.rs"));
    }

    #[test]
    fn dot_segments_are_collapsed() {
        let resolved = resolve(Path::new("/work/project"), "./src/../docs/./a.md");
        assert_eq!(resolved, PathBuf::from("/work/project/docs/a.md"));
    }

    #[test]
    fn parent_segments_can_leave_workspace() {
        let resolved = resolve(Path::new("/work/project"), "../other/f.txt");
        assert_eq!(resolved, PathBuf::from("/work/other/f.txt"));
    }

    #[test]
    fn parent_segments_stop_at_root() {
        let resolved = resolve(Path::new("/work"), "../../../f.txt");
        assert_eq!(resolved, PathBuf::from("/f.txt"));
    }

    #[test]
    fn absolute_path_is_kept() {
        let resolved = resolve(Path::new("/work/project"), "/etc/hosts");
        assert_eq!(resolved, PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn empty_path_is_workspace() {
        let resolved = resolve(Path::new("/work/project"), "");
        assert_eq!(resolved, PathBuf::from("/work/project"));
        let resolved = resolve(Path::new("/work/project"), ".");
        assert_eq!(resolved, PathBuf::from("/work/project"));
    }

    #[test]
    fn home_marker_expands() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(resolve(Path::new("/work"), "~/notes.txt"), home.join("notes.txt"));
        assert_eq!(resolve(Path::new("/work"), "~"), home);
    }

    #[test]
    fn tilde_inside_name_is_literal() {
        let resolved = resolve(Path::new("/work"), "backup~/f");
        assert_eq!(resolved, PathBuf::from("/work/backup~/f"));
    }
}
