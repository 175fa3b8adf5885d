use anyhow::anyhow;
use tracing::instrument;

use crate::config::MirrorConfig;
use crate::copy::{CopyEngine, FsEngine};
use crate::discovery;
use crate::progress::{self, Progress, Status};
use crate::retry;
use crate::task::TaskQueue;
use crate::worker;

/// Error type for mirror runs that preserves the final counters even on failure.
///
/// # Logging Convention
/// The Display implementation automatically shows the full error chain, so you can log it
/// with any format specifier:
/// ```ignore
/// tracing::error!("operation failed: {}", &error);   // ✅ Shows full chain
/// tracing::error!("operation failed: {:#}", &error); // ✅ Shows full chain
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub discovered: u64,
    pub completed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub attempts: u64,
    pub bytes_copied: u64,
    pub duration: std::time::Duration,
}

impl Summary {
    fn new(status: &Status, duration: std::time::Duration) -> Self {
        Self {
            discovered: status.discovered,
            completed: status.completed,
            skipped: status.skipped,
            errored: status.errored,
            attempts: status.attempt,
            bytes_copied: status.bytes_copied,
            duration,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // truncate to milliseconds, humantime prints every sub-second unit otherwise
        let duration = std::time::Duration::from_millis(self.duration.as_millis() as u64);
        write!(
            f,
            "files discovered: {}\n\
            files copied: {}\n\
            files unchanged: {}\n\
            files failed: {}\n\
            retry attempts: {}\n\
            bytes copied: {}\n\
            walltime: {}",
            self.discovered,
            self.completed,
            self.skipped,
            self.errored,
            self.attempts,
            bytesize::ByteSize(self.bytes_copied),
            humantime::format_duration(duration),
        )
    }
}

/// Mirrors `src` into `dst` using the local filesystem.
pub async fn mirror(
    src: &std::path::Path,
    dst: &std::path::Path,
    config: &MirrorConfig,
) -> Result<Summary, Error> {
    mirror_with_engine(std::sync::Arc::new(FsEngine), src, dst, config).await
}

/// Runs the whole pipeline: discovery, worker pool, retry coordinator and progress reporter.
/// Returns once every discovered file was copied or skipped, or once the retry budget ran out.
pub async fn mirror_with_engine(
    engine: std::sync::Arc<dyn CopyEngine>,
    src: &std::path::Path,
    dst: &std::path::Path,
    config: &MirrorConfig,
) -> Result<Summary, Error> {
    mirror_with_progress(
        engine,
        std::sync::Arc::new(Progress::new()),
        src,
        dst,
        config,
    )
    .await
}

/// Same as [`mirror_with_engine`] but records into a caller-provided [`Progress`], which can be
/// observed while the run is in flight.
#[instrument(skip(engine, progress))]
pub async fn mirror_with_progress(
    engine: std::sync::Arc<dyn CopyEngine>,
    progress: std::sync::Arc<Progress>,
    src: &std::path::Path,
    dst: &std::path::Path,
    config: &MirrorConfig,
) -> Result<Summary, Error> {
    config
        .validate()
        .map_err(|err| Error::new(anyhow!(err), Default::default()))?;
    let top_level = discovery::read_top_level(src)
        .await
        .map_err(|err| Error::new(err, Default::default()))?;
    let shared = std::sync::Arc::new(worker::Shared {
        engine,
        progress: progress.clone(),
        src_root: src.to_owned(),
        dst_root: dst.to_owned(),
        tasks: TaskQueue::new(),
        errors: TaskQueue::new(),
    });
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut workers = worker::spawn_pool(config.workers, shared.clone(), &cancel);
    let reporter = tokio::spawn(progress::run_reporter(
        progress.clone(),
        config.progress_delay,
        cancel.clone(),
    ));
    let discovery = tokio::spawn(discovery::run(
        progress.clone(),
        src.to_owned(),
        top_level,
        shared.tasks.clone(),
    ));
    let coordinator = retry::Coordinator::new(
        &progress,
        &shared.tasks,
        &shared.errors,
        config.retries,
        config.retry_wait,
    );
    let outcome = coordinator.run().await;
    if let Err(error) = discovery.await {
        tracing::error!("discovery failed: {}", error);
    }
    // shut everything down: workers are idle once the coordinator returns
    cancel.cancel();
    shared.tasks.close();
    while let Some(res) = workers.join_next().await {
        if let Err(error) = res {
            tracing::error!("copy worker failed: {}", error);
        }
    }
    if let Err(error) = reporter.await {
        tracing::error!("progress reporter failed: {}", error);
    }
    let summary = Summary::new(&progress.get(), progress.get_duration());
    match outcome {
        Ok((retry::State::Done, _)) => {
            progress.log_status("finished");
            Ok(summary)
        }
        Ok((state, status)) => {
            progress.log_status("failed");
            tracing::error!(
                "{} files could not be copied after {} retries (state: {:?})",
                status.errored,
                status.attempt,
                state
            );
            Err(Error::new(
                anyhow!(
                    "{} files could not be copied after {} retries",
                    status.errored,
                    status.attempt
                ),
                summary,
            ))
        }
        Err(err) => Err(Error::new(err, summary)),
    }
}
