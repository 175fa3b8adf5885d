//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Settings of the mirroring pipeline itself
#[derive(Debug, Clone, Copy)]
pub struct MirrorConfig {
    /// Number of copy workers pulling tasks from the task queue
    pub workers: usize,
    /// Delay between progress reports
    pub progress_delay: std::time::Duration,
    /// Maximum number of retry attempts over the failed subset (0 = no retries)
    pub retries: usize,
    /// Cooldown inserted before each retry attempt
    pub retry_wait: std::time::Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            progress_delay: std::time::Duration::from_secs(1),
            retries: 30,
            retry_wait: std::time::Duration::from_secs(3),
        }
    }
}

impl MirrorConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("number of workers must be greater than 0".to_string());
        }
        if self.progress_delay.is_zero() {
            return Err("progress delay must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress console output
    pub quiet: bool,
    /// Emit debug-level lines
    pub verbose: bool,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Tracing configuration
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Log file path, opened in append mode
    pub log_file: Option<std::path::PathBuf>,
}
