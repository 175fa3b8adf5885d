use tracing::{event, instrument, Level};

/// Target of the progress and summary lines; the console layer lets these through at INFO.
pub const PROGRESS_TARGET: &str = module_path!();

/// Snapshot of the pipeline counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub discovered: u64,
    pub completed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub attempt: u64,
    pub bytes_copied: u64,
}

impl Status {
    /// Number of discovered tasks with a recorded outcome in the current attempt.
    #[must_use]
    pub fn accounted(&self) -> u64 {
        self.completed + self.skipped + self.errored
    }

    #[must_use]
    pub fn percent(&self) -> u64 {
        if self.discovered == 0 {
            return 0;
        }
        (self.completed + self.skipped) * 100 / self.discovered
    }
}

#[derive(Debug, Default)]
struct State {
    status: Status,
    discovery_finished: bool,
}

/// Shared progress counters.
///
/// All updates go through one mutex which is held only for the duration of a single
/// read-modify-write. Every recorded outcome (and the end of discovery) wakes up tasks waiting
/// in [`Progress::wait_pass_complete`], so completion is observed without polling.
#[derive(Debug)]
pub struct Progress {
    state: std::sync::Mutex<State>,
    changed: tokio::sync::Notify,
    start_time: std::time::Instant,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(State::default()),
            changed: tokio::sync::Notify::new(),
            start_time: std::time::Instant::now(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // counters stay consistent even if a holder panicked, every update is a single assignment
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut State)) {
        f(&mut *self.lock());
        self.changed.notify_waiters();
    }

    /// Must be called before the corresponding task is published.
    pub fn file_discovered(&self) {
        self.lock().status.discovered += 1;
    }

    pub fn discovery_finished(&self) {
        self.update(|state| state.discovery_finished = true);
    }

    pub fn file_completed(&self, bytes: u64) {
        self.update(|state| {
            state.status.completed += 1;
            state.status.bytes_copied += bytes;
        });
    }

    pub fn file_skipped(&self) {
        self.update(|state| state.status.skipped += 1);
    }

    pub fn file_errored(&self) {
        self.update(|state| state.status.errored += 1);
    }

    /// Starts a retry attempt: clears the error tally and bumps the attempt number.
    pub fn start_attempt(&self) -> u64 {
        let mut state = self.lock();
        state.status.errored = 0;
        state.status.attempt += 1;
        state.status.attempt
    }

    #[instrument(skip(self))]
    pub fn get(&self) -> Status {
        let status = self.lock().status;
        if status.accounted() > status.discovered {
            event!(
                Level::DEBUG,
                "Progress inversion - discovered: {}, accounted for: {}",
                status.discovered,
                status.accounted()
            );
        }
        status
    }

    fn pass_status(&self) -> Option<Status> {
        let state = self.lock();
        if state.discovery_finished && state.status.accounted() >= state.status.discovered {
            Some(state.status)
        } else {
            None
        }
    }

    /// Waits until discovery has finished and every discovered task has an outcome.
    pub async fn wait_pass_complete(&self) -> Status {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // register before checking so that an update racing with the check is not lost
            notified.as_mut().enable();
            if let Some(status) = self.pass_status() {
                return status;
            }
            notified.await;
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Logs a snapshot of the counters to the console and the log file.
    pub fn log_status(&self, msg: &str) {
        let status = self.get();
        let secs = self.get_duration().as_secs_f64();
        let rate = if secs > 0.0 {
            status.bytes_copied as f64 / secs
        } else {
            0.0
        };
        tracing::info!(
            target: PROGRESS_TARGET,
            percent = %format!("{}%", status.percent()),
            completed = status.completed,
            skipped = status.skipped,
            errored = status.errored,
            discovered = status.discovered,
            attempt = status.attempt,
            copied = %bytesize::ByteSize(status.bytes_copied),
            rate = %format!("{}/s", bytesize::ByteSize(rate as u64)),
            "{msg}"
        );
    }
}

/// Logs a progress snapshot every `delay` until cancelled.
pub async fn run_reporter(
    progress: std::sync::Arc<Progress>,
    delay: std::time::Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    tracing::debug!("progress reporter started, interval: {:?}", delay);
    let mut interval = tokio::time::interval(delay);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => progress.log_status("progress"),
        }
    }
    tracing::debug!("progress reporter stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tracing_test::traced_test;

    #[test]
    fn percent_handles_empty_tree() {
        let status = Status::default();
        assert_eq!(status.percent(), 0);
    }

    #[test]
    fn percent_counts_completed_and_skipped() {
        let status = Status {
            discovered: 4,
            completed: 1,
            skipped: 2,
            errored: 1,
            ..Default::default()
        };
        assert_eq!(status.percent(), 75);
        assert_eq!(status.accounted(), 4);
    }

    #[test]
    fn threaded_counting() -> Result<()> {
        let progress = Progress::new();
        std::thread::scope(|scope| {
            for _ in 0..10 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        progress.file_discovered();
                        progress.file_completed(2);
                    }
                });
            }
        });
        let status = progress.get();
        assert_eq!(status.discovered, 1000);
        assert_eq!(status.completed, 1000);
        assert_eq!(status.bytes_copied, 2000);
        Ok(())
    }

    #[test]
    fn start_attempt_resets_errors_only() {
        let progress = Progress::new();
        progress.file_discovered();
        progress.file_discovered();
        progress.file_skipped();
        progress.file_errored();
        assert_eq!(progress.start_attempt(), 1);
        let status = progress.get();
        assert_eq!(status.errored, 0);
        assert_eq!(status.skipped, 1);
        assert_eq!(status.discovered, 2);
        assert_eq!(status.attempt, 1);
    }

    #[tokio::test]
    async fn pass_not_complete_before_discovery_finishes() -> Result<()> {
        let progress = std::sync::Arc::new(Progress::new());
        // nothing discovered yet and discovery still running: 0 >= 0 must not count as done
        let waiter = {
            let progress = progress.clone();
            tokio::spawn(async move { progress.wait_pass_complete().await })
        };
        progress.file_discovered();
        progress.file_skipped();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        progress.file_discovered();
        progress.discovery_finished();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        progress.file_completed(10);
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), waiter).await??;
        assert_eq!(status.discovered, 2);
        assert_eq!(status.accounted(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn reporter_logs_on_every_interval() -> Result<()> {
        let progress = std::sync::Arc::new(Progress::new());
        progress.file_discovered();
        progress.file_discovered();
        progress.file_completed(4);
        let cancel = tokio_util::sync::CancellationToken::new();
        // polled in place so the lines land in this test's span
        let reporter = run_reporter(
            progress.clone(),
            std::time::Duration::from_millis(100),
            cancel.clone(),
        );
        tokio::pin!(reporter);
        tokio::select! {
            _ = &mut reporter => panic!("reporter stopped before being cancelled"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => {}
        }
        logs_assert(|lines: &[&str]| {
            let reported = lines
                .iter()
                .filter(|line| line.contains("percent=50%") && line.contains("attempt=0"))
                .count();
            if reported >= 2 {
                Ok(())
            } else {
                Err(format!("expected at least 2 progress lines, got {reported}"))
            }
        });
        assert!(logs_contain("completed=1"));
        assert!(logs_contain("discovered=2"));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), reporter).await?;
        assert!(logs_contain("progress reporter stopped"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_pass_completes_once_discovery_finishes() {
        let progress = Progress::new();
        progress.discovery_finished();
        let status = progress.wait_pass_complete().await;
        assert_eq!(status, Status::default());
    }
}
