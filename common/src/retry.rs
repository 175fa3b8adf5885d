use crate::progress::{Progress, Status};
use crate::task::TaskQueue;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    AwaitingCompletion,
    Cooldown,
    Done,
    GiveUp,
}

/// Drives attempts: waits for every discovered task to be accounted for, then either finishes
/// or, after a cooldown, feeds the failed subset back into the task queue.
///
/// Attempt 0 is the initial pass, attempts `1..=retries` re-run whatever failed in the previous
/// attempt. A task that keeps failing is therefore retried exactly `retries` times.
pub struct Coordinator<'a> {
    progress: &'a Progress,
    tasks: &'a TaskQueue,
    errors: &'a TaskQueue,
    retries: u64,
    retry_wait: std::time::Duration,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        progress: &'a Progress,
        tasks: &'a TaskQueue,
        errors: &'a TaskQueue,
        retries: usize,
        retry_wait: std::time::Duration,
    ) -> Self {
        Self {
            progress,
            tasks,
            errors,
            retries: retries as u64,
            retry_wait,
        }
    }

    fn after_pass(&self, status: &Status) -> State {
        if status.errored == 0 {
            State::Done
        } else if status.attempt < self.retries {
            State::Cooldown
        } else {
            State::GiveUp
        }
    }

    async fn cooldown(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.retry_wait).await;
        // every failure of the finished attempt is already queued, nothing else can be added now
        let failed = self.errors.drain();
        let attempt = self.progress.start_attempt();
        tracing::warn!(
            "retry attempt {}/{}: resubmitting {} failed files",
            attempt,
            self.retries,
            failed.len()
        );
        for task in failed {
            self.tasks.push(task)?;
        }
        Ok(())
    }

    /// Runs until `Done` or `GiveUp` and returns the terminal state with the last pass status.
    pub async fn run(&self) -> anyhow::Result<(State, Status)> {
        let mut state = State::AwaitingCompletion;
        let mut status = Status::default();
        loop {
            tracing::debug!("retry coordinator state: {:?}", state);
            state = match state {
                State::AwaitingCompletion => {
                    status = self.progress.wait_pass_complete().await;
                    self.progress.log_status("pass complete");
                    self.after_pass(&status)
                }
                State::Cooldown => {
                    tracing::info!(
                        "{} files failed, retrying in {}",
                        status.errored,
                        humantime::format_duration(self.retry_wait)
                    );
                    self.cooldown().await?;
                    State::AwaitingCompletion
                }
                State::Done | State::GiveUp => return Ok((state, status)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::CopyTask;
    use anyhow::Result;

    fn fail_all(progress: &Progress, tasks: &TaskQueue, errors: &TaskQueue) -> usize {
        let drained = tasks.drain();
        for task in &drained {
            errors.push(task.clone()).unwrap();
            progress.file_errored();
        }
        drained.len()
    }

    #[test]
    fn after_pass_transitions() {
        let progress = Progress::new();
        let tasks = TaskQueue::new();
        let errors = TaskQueue::new();
        let coordinator =
            Coordinator::new(&progress, &tasks, &errors, 2, std::time::Duration::ZERO);
        let mut status = Status::default();
        assert_eq!(coordinator.after_pass(&status), State::Done);
        status.errored = 1;
        assert_eq!(coordinator.after_pass(&status), State::Cooldown);
        status.attempt = 2;
        assert_eq!(coordinator.after_pass(&status), State::GiveUp);
    }

    #[tokio::test]
    async fn gives_up_after_configured_retries() -> Result<()> {
        let progress = std::sync::Arc::new(Progress::new());
        let tasks = TaskQueue::new();
        let errors = TaskQueue::new();
        for name in ["a", "b"] {
            progress.file_discovered();
            tasks.push(CopyTask::new(name))?;
        }
        progress.file_discovered();
        progress.file_skipped();
        progress.discovery_finished();
        // a stand-in worker pool where every task fails
        let attempts = {
            let progress = progress.clone();
            let tasks = tasks.clone();
            let errors = errors.clone();
            tokio::spawn(async move {
                let mut attempts = 0;
                while let Some(task) = tasks.pop().await {
                    errors.push(task).unwrap();
                    progress.file_errored();
                    attempts += 1;
                }
                attempts
            })
        };
        let (state, status) = Coordinator::new(
            &progress,
            &tasks,
            &errors,
            3,
            std::time::Duration::from_millis(10),
        )
        .run()
        .await?;
        tasks.close();
        assert_eq!(state, State::GiveUp);
        assert_eq!(status.attempt, 3);
        assert_eq!(status.errored, 2);
        assert_eq!(status.skipped, 1);
        // initial pass plus three retries of both files
        assert_eq!(attempts.await?, 8);
        Ok(())
    }

    #[tokio::test]
    async fn zero_retries_gives_up_immediately() -> Result<()> {
        let progress = Progress::new();
        let tasks = TaskQueue::new();
        let errors = TaskQueue::new();
        progress.file_discovered();
        tasks.push(CopyTask::new("a"))?;
        progress.discovery_finished();
        assert_eq!(fail_all(&progress, &tasks, &errors), 1);
        let (state, status) =
            Coordinator::new(&progress, &tasks, &errors, 0, std::time::Duration::ZERO)
                .run()
                .await?;
        assert_eq!(state, State::GiveUp);
        assert_eq!(status.attempt, 0);
        assert_eq!(errors.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn done_without_errors() -> Result<()> {
        let progress = Progress::new();
        let tasks = TaskQueue::new();
        let errors = TaskQueue::new();
        progress.file_discovered();
        progress.file_completed(1);
        progress.discovery_finished();
        let (state, status) =
            Coordinator::new(&progress, &tasks, &errors, 5, std::time::Duration::ZERO)
                .run()
                .await?;
        assert_eq!(state, State::Done);
        assert_eq!(status.completed, 1);
        Ok(())
    }
}
