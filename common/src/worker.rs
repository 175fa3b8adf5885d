use tracing::instrument;

use crate::copy::CopyEngine;
use crate::progress::Progress;
use crate::task::{CopyTask, TaskQueue};

/// State shared by every worker of one pipeline run.
pub struct Shared {
    pub engine: std::sync::Arc<dyn CopyEngine>,
    pub progress: std::sync::Arc<Progress>,
    pub src_root: std::path::PathBuf,
    pub dst_root: std::path::PathBuf,
    pub tasks: TaskQueue,
    pub errors: TaskQueue,
}

/// Outcome of processing one task.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Copied,
    Skipped,
    Failed,
}

pub struct Worker {
    id: usize,
    shared: std::sync::Arc<Shared>,
}

impl Worker {
    pub fn new(id: usize, shared: std::sync::Arc<Shared>) -> Self {
        Self { id, shared }
    }

    /// Takes tasks one at a time until cancelled or until the task queue is closed.
    pub async fn run(self, cancel: tokio_util::sync::CancellationToken) {
        tracing::debug!("worker {} started", self.id);
        loop {
            let task = tokio::select! {
                _ = cancel.cancelled() => break,
                task = self.shared.tasks.pop() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.process(task).await;
        }
        tracing::debug!("worker {} stopped", self.id);
    }

    #[instrument(skip(self), fields(worker = self.id))]
    pub async fn process(&self, task: CopyTask) -> Outcome {
        let shared = &self.shared;
        let src = task.resolve(&shared.src_root);
        let dst = task.resolve(&shared.dst_root);
        let diff = match shared.engine.diff_check(&src, &dst).await {
            Ok(diff) => diff,
            Err(error) => {
                tracing::error!(file = %task, worker = self.id, "COPY ERROR: {:#}", error);
                return self.fail(task);
            }
        };
        let size = bytesize::ByteSize(diff.src_stat.size);
        if !diff.needs_copy() {
            tracing::info!(file = %task, %size, worker = self.id, "COPY SKIP");
            shared.progress.file_skipped();
            return Outcome::Skipped;
        }
        tracing::debug!(
            file = %task,
            %size,
            worker = self.id,
            reason = ?diff.staleness,
            "COPY START"
        );
        match shared.engine.copy(&src, &dst, &diff.src_stat).await {
            Ok(bytes) => {
                tracing::info!(file = %task, %size, worker = self.id, "COPY FINISH");
                shared.progress.file_completed(bytes);
                Outcome::Copied
            }
            Err(error) => {
                tracing::error!(file = %task, %size, worker = self.id, "COPY ERROR: {:#}", error);
                self.fail(task)
            }
        }
    }

    fn fail(&self, task: CopyTask) -> Outcome {
        // queue the task before counting it so a completed pass always has its failures drainable
        if let Err(error) = self.shared.errors.push(task) {
            tracing::warn!("{:#}", error);
        }
        self.shared.progress.file_errored();
        Outcome::Failed
    }
}

/// Starts `count` workers sharing one task queue.
pub fn spawn_pool(
    count: usize,
    shared: std::sync::Arc<Shared>,
    cancel: &tokio_util::sync::CancellationToken,
) -> tokio::task::JoinSet<()> {
    let mut join_set = tokio::task::JoinSet::new();
    for id in 0..count {
        let worker = Worker::new(id, shared.clone());
        join_set.spawn(worker.run(cancel.clone()));
    }
    tracing::info!("started {} copy workers", count);
    join_set
}
