//! Shared library behind the `rcopy` tool.
//!
//! `rcopy` mirrors a source directory tree into a destination tree, copying only files that are
//! missing or stale (different size, or a newer source modification time). The pipeline is made
//! of:
//!
//! - [`discovery`] - walks the source tree and publishes one [`task::CopyTask`] per regular file,
//! - [`worker`] - a fixed pool of workers taking tasks and running the [`copy::CopyEngine`],
//! - [`retry`] - waits for every discovered task to be accounted for and resubmits failures,
//! - [`progress`] - the shared counters and the periodic progress reporter.
//!
//! [`mirror()`] wires these together. [`run`] sets up the tokio runtime and logging for the
//! binary.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), common::mirror::Error> {
//! let summary = common::mirror(
//!     std::path::Path::new("/data/src"),
//!     std::path::Path::new("/backup/dst"),
//!     &common::MirrorConfig::default(),
//! )
//! .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod config;
pub mod copy;
pub mod discovery;
pub mod filecmp;
pub mod mirror;
pub mod progress;
pub mod retry;
pub mod task;
pub mod worker;

#[cfg(test)]
mod testutils;

pub use config::{MirrorConfig, OutputConfig, RuntimeConfig, TracingConfig};
pub use mirror::{Summary, mirror};

fn init_tracing(output: &OutputConfig, tracing: &TracingConfig) -> anyhow::Result<()> {
    let file_level = if output.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let file_layer = match &tracing.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {path:?}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Arc::new(log_file))
                    .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                        file_level,
                    )),
            )
        }
        None => None,
    };
    // the console only gets progress lines and problems, per-file lines go to the log file
    let console_layer = if output.quiet {
        None
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
                .with_writer(std::io::stderr)
                .with_filter(
                    tracing_subscriber::filter::Targets::new()
                        .with_target(progress::PROGRESS_TARGET, tracing::Level::INFO)
                        .with_default(tracing::Level::WARN),
                ),
        )
    };
    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}

/// Sets up logging and the tokio runtime, then runs `func` to completion.
///
/// Returns `None` if the setup failed or `func` returned an error; in both cases the error has
/// already been reported.
pub fn run<Fut>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    tracing: TracingConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    if let Err(error) = init_tracing(&output, &tracing) {
        eprintln!("{error:#}");
        return None;
    }
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!("Failed to create tokio runtime: {}", error);
            if output.quiet {
                eprintln!("Failed to create tokio runtime: {error}");
            }
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", error);
            if output.quiet {
                // nothing reached the console, still leave a trace on stderr
                eprintln!("{error:#}");
            }
            None
        }
    }
}
