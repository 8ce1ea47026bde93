//! Tool execution for one assistant message.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};

use crate::llm::{ToolRequest, ToolResultMessage};
use crate::tools::ToolRegistry;

/// Run every request of one assistant message and return the results in
/// request order.
///
/// Requests touching different paths run concurrently, at most `concurrency`
/// at a time. Requests resolving to the same path run one after another in
/// the order they were requested.
pub async fn execute_batch(
    registry: &ToolRegistry,
    workspace: &Path,
    requests: &[ToolRequest],
    concurrency: usize,
) -> Vec<ToolResultMessage> {
    let groups = group_by_target(registry, workspace, requests);
    tracing::debug!(
        "Executing {} tool calls in {} groups",
        requests.len(),
        groups.len()
    );

    let mut slots: Vec<Option<ToolResultMessage>> = vec![None; requests.len()];
    let mut finished = stream::iter(groups.into_iter().map(|group| async move {
        let mut results = Vec::with_capacity(group.len());
        for idx in group {
            results.push((idx, registry.dispatch(&requests[idx], workspace).await));
        }
        results
    }))
    .buffer_unordered(concurrency.max(1));

    while let Some(results) = finished.next().await {
        for (idx, result) in results {
            slots[idx] = Some(result);
        }
    }

    slots.into_iter().flatten().collect()
}

/// Partition request indices so that requests sharing a target path land in
/// the same group. Groups and their members keep request order.
fn group_by_target(
    registry: &ToolRegistry,
    workspace: &Path,
    requests: &[ToolRequest],
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut by_path: HashMap<PathBuf, usize> = HashMap::new();

    for (idx, request) in requests.iter().enumerate() {
        match registry.target_path(request, workspace) {
            Some(path) => match by_path.get(&path) {
                Some(&group) => groups[group].push(idx),
                None => {
                    by_path.insert(path, groups.len());
                    groups.push(vec![idx]);
                }
            },
            None => groups.push(vec![idx]),
        }
    }

    groups
}
