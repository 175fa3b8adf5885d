use anyhow::Context;
use async_recursion::async_recursion;
use tracing::instrument;

use crate::progress::Progress;
use crate::task::{CopyTask, TaskQueue};

/// Kind of a first-level entry under the source root.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Entry directly under the source root.
#[derive(Clone, Debug)]
pub struct TopLevelEntry {
    pub name: std::path::PathBuf,
    pub kind: EntryKind,
}

fn entry_kind(file_type: &std::fs::FileType) -> Option<EntryKind> {
    if file_type.is_dir() {
        Some(EntryKind::Dir)
    } else if file_type.is_file() {
        Some(EntryKind::File)
    } else {
        None
    }
}

/// Lists the source root. Failing to read it is fatal for the whole run.
#[instrument]
pub async fn read_top_level(src_root: &std::path::Path) -> anyhow::Result<Vec<TopLevelEntry>> {
    let mut entries = tokio::fs::read_dir(src_root)
        .await
        .with_context(|| format!("cannot open source directory {src_root:?} for reading"))?;
    let mut top_level = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing source directory {src_root:?}"))?
    {
        let entry_path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(error) => {
                tracing::error!(
                    "cannot read file type of {:?}, skipping: {}",
                    entry_path,
                    error
                );
                continue;
            }
        };
        match entry_kind(&file_type) {
            Some(kind) => top_level.push(TopLevelEntry {
                name: entry.file_name().into(),
                kind,
            }),
            None => tracing::debug!(
                "{:?} is not a regular file or directory, skipping",
                entry_path
            ),
        }
    }
    Ok(top_level)
}

fn publish(progress: &Progress, tasks: &TaskQueue, rel_path: std::path::PathBuf) -> bool {
    progress.file_discovered();
    let task = CopyTask::new(rel_path);
    tracing::debug!("discovered {}", task);
    if let Err(error) = tasks.push(task) {
        tracing::debug!("{:#}", error);
        return false;
    }
    true
}

/// Walks `rel_dir` depth-first, publishing one task per regular file. A directory that cannot
/// be listed is logged and its subtree is left out.
#[async_recursion]
async fn traverse(
    progress: &Progress,
    src_root: &std::path::Path,
    rel_dir: &std::path::Path,
    tasks: &TaskQueue,
) {
    let dir = src_root.join(rel_dir);
    tracing::debug!("reading directory {:?}", dir);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(error) => {
            tracing::error!(
                "cannot open directory {:?} for reading, skipping: {}",
                dir,
                error
            );
            return;
        }
    };
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                tracing::error!("failed traversing directory {:?}: {}", dir, error);
                break;
            }
        };
        let rel_path = rel_dir.join(entry.file_name());
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(error) => {
                tracing::error!(
                    "cannot read file type of {:?}, skipping: {}",
                    entry.path(),
                    error
                );
                continue;
            }
        };
        match entry_kind(&file_type) {
            Some(EntryKind::Dir) => traverse(progress, src_root, &rel_path, tasks).await,
            Some(EntryKind::File) => {
                if !publish(progress, tasks, rel_path) {
                    return;
                }
            }
            None => tracing::debug!(
                "{:?} is not a regular file or directory, skipping",
                entry.path()
            ),
        }
    }
}

/// Publishes tasks for the top-level files and fans out one traversal per top-level
/// directory. Marks discovery as finished once every traversal has returned, a traversal that
/// panicked is logged and treated like an unreadable subtree.
pub async fn run(
    progress: std::sync::Arc<Progress>,
    src_root: std::path::PathBuf,
    top_level: Vec<TopLevelEntry>,
    tasks: TaskQueue,
) {
    let src_root = std::sync::Arc::new(src_root);
    let mut join_set = tokio::task::JoinSet::new();
    for entry in top_level {
        match entry.kind {
            EntryKind::Dir => {
                let progress = progress.clone();
                let src_root = src_root.clone();
                let tasks = tasks.clone();
                tracing::info!("discovering {:?}", src_root.join(&entry.name));
                join_set.spawn(async move {
                    traverse(&progress, &src_root, &entry.name, &tasks).await;
                });
            }
            EntryKind::File => {
                publish(&progress, &tasks, entry.name);
            }
        }
    }
    while let Some(res) = join_set.join_next().await {
        if let Err(error) = res {
            tracing::error!("discovery task failed: {}", error);
        }
    }
    progress.discovery_finished();
    tracing::info!(
        "discovery finished, {} files found",
        progress.get().discovered
    );
}
