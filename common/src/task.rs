/// One file scheduled for a copy decision, identified by its path relative to both roots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CopyTask {
    rel_path: std::path::PathBuf,
}

impl CopyTask {
    pub fn new(rel_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            rel_path: rel_path.into(),
        }
    }

    pub fn rel_path(&self) -> &std::path::Path {
        &self.rel_path
    }

    pub fn resolve(&self, root: &std::path::Path) -> std::path::PathBuf {
        root.join(&self.rel_path)
    }
}

impl std::fmt::Display for CopyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.rel_path.display())
    }
}

/// Unbounded many-producer/many-consumer conduit of tasks.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: async_channel::Sender<CopyTask>,
    rx: async_channel::Receiver<CopyTask>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    /// Fails only once the queue has been closed.
    pub fn push(&self, task: CopyTask) -> anyhow::Result<()> {
        self.tx
            .try_send(task)
            .map_err(|err| anyhow::anyhow!("task queue closed, dropping {}", err.into_inner()))
    }

    /// Waits for the next task, `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<CopyTask> {
        self.rx.recv().await.ok()
    }

    /// Takes every task queued right now without waiting for more.
    pub fn drain(&self) -> Vec<CopyTask> {
        let mut tasks = Vec::with_capacity(self.rx.len());
        while let Ok(task) = self.rx.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn close(&self) {
        self.tx.close();
    }
}
