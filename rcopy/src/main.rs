use anyhow::anyhow;
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rcopy",
    version,
    about = "Mirror a directory tree, copying only new or changed files",
    long_about = "`rcopy` mirrors SRC into DST using a pool of concurrent workers.

A file is copied when it is missing from DST, when its size differs, or when the SRC copy has a
newer modification time. Copied files get the modification time of their source. Files that fail
to copy are retried after a cooldown, up to --retries times.

Nothing under SRC is ever modified and nothing under DST is ever removed.

EXIT CODES:
    0 - All files copied or already up to date
    1 - SRC could not be read, the log file could not be opened, or files still failed after all retries

EXAMPLES:
    # Mirror with the default 16 workers, logging to ./rcopy.log
    rcopy /data /backup/data

    # More workers, fewer retries, debug lines in a custom log file
    rcopy -t 64 -r 5 -w 10s -l /var/log/rcopy.log -v /data /backup/data"
)]
struct Args {
    // Copy options
    /// Number of copy workers
    #[arg(
        short = 't',
        long = "threads",
        default_value = "16",
        value_name = "N",
        help_heading = "Copy options"
    )]
    threads: usize,

    /// Number of retry attempts over the files that failed to copy, 0 disables retries
    #[arg(
        short = 'r',
        long,
        default_value = "30",
        value_name = "N",
        help_heading = "Copy options"
    )]
    retries: usize,

    /// Wait time before each retry attempt
    ///
    /// This option accepts a human readable duration, e.g. "500ms", "3s", "1min" etc.
    #[arg(
        short = 'w',
        long,
        default_value = "3s",
        value_name = "DELAY",
        value_parser = humantime::parse_duration,
        help_heading = "Copy options"
    )]
    retry_wait: std::time::Duration,

    // Progress & output
    /// Sets the delay between progress updates
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(
        short = 'd',
        long,
        default_value = "1s",
        value_name = "DELAY",
        value_parser = humantime::parse_duration,
        help_heading = "Progress & output"
    )]
    progress_delay: std::time::Duration,

    /// File to append log lines to
    #[arg(
        short = 'l',
        long,
        default_value = "rcopy.log",
        value_name = "PATH",
        help_heading = "Progress & output"
    )]
    log: std::path::PathBuf,

    /// Write debug lines to the log file
    #[arg(short = 'v', long = "verbose", help_heading = "Progress & output")]
    verbose: bool,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, suppress console output (the log file is still written)
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of runtime worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source directory
    #[arg()]
    src: std::path::PathBuf,

    /// Destination directory
    #[arg()]
    dst: std::path::PathBuf,
}

#[instrument]
async fn async_main(args: Args) -> anyhow::Result<common::Summary> {
    let config = common::MirrorConfig {
        workers: args.threads,
        progress_delay: args.progress_delay,
        retries: args.retries,
        retry_wait: args.retry_wait,
    };
    tracing::info!(
        src = ?args.src,
        dst = ?args.dst,
        threads = config.workers,
        progress_delay = %humantime::format_duration(config.progress_delay),
        retries = config.retries,
        retry_wait = %humantime::format_duration(config.retry_wait),
        log = ?args.log,
        verbose = args.verbose,
        "rcopy start"
    );
    match common::mirror(&args.src, &args.dst, &config).await {
        Ok(summary) => Ok(summary),
        Err(error) => {
            if args.summary {
                return Err(anyhow!("{}\n\n{}", error, &error.summary));
            }
            Err(error.into())
        }
    }
}

fn main() {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let tracing = common::TracingConfig {
        log_file: Some(args.log.clone()),
    };
    if common::run(output, runtime, tracing, func).is_none() {
        std::process::exit(1);
    }
}
