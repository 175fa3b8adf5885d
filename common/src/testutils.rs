use crate::copy::{CopyEngine, Diff, FsEngine};
use crate::filecmp::FileStat;

pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("rcopy_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- qux
    //       |- 5.txt
    // |- empty
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await?;
    tokio::fs::write(foo_path.join("0.txt"), "0").await?;
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await?;
    tokio::fs::write(bar_path.join("1.txt"), "1").await?;
    tokio::fs::write(bar_path.join("2.txt"), "22").await?;
    tokio::fs::write(bar_path.join("3.txt"), "333").await?;
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await?;
    tokio::fs::write(baz_path.join("4.txt"), "4444").await?;
    let qux_path = baz_path.join("qux");
    tokio::fs::create_dir(&qux_path).await?;
    tokio::fs::write(qux_path.join("5.txt"), "55555").await?;
    tokio::fs::create_dir(foo_path.join("empty")).await?;
    Ok(tmp_dir)
}

/// Filesystem engine whose copies of selected files fail a fixed number of times.
pub struct FlakyEngine {
    failing: std::collections::HashMap<std::path::PathBuf, usize>,
    remaining: std::sync::Mutex<std::collections::HashMap<std::path::PathBuf, usize>>,
    pub copy_calls: std::sync::atomic::AtomicUsize,
}

impl FlakyEngine {
    /// `failing` maps source file names to the number of copy attempts that fail.
    pub fn new(failing: &[(&str, usize)]) -> Self {
        let failing: std::collections::HashMap<_, _> = failing
            .iter()
            .map(|(name, count)| (std::path::PathBuf::from(name), *count))
            .collect();
        Self {
            remaining: std::sync::Mutex::new(failing.clone()),
            failing,
            copy_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failures_left(&self, name: &str) -> usize {
        self.remaining.lock().unwrap()[std::path::Path::new(name)]
    }
}

#[async_trait::async_trait]
impl CopyEngine for FlakyEngine {
    async fn diff_check(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
    ) -> anyhow::Result<Diff> {
        FsEngine.diff_check(src, dst).await
    }

    async fn copy(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
        src_stat: &FileStat,
    ) -> anyhow::Result<u64> {
        self.copy_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let name = std::path::PathBuf::from(src.file_name().unwrap());
        if self.failing.contains_key(&name) {
            let mut remaining = self.remaining.lock().unwrap();
            let left = remaining.get_mut(&name).unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(anyhow::anyhow!("injected failure copying {:?}", src));
            }
        }
        FsEngine.copy(src, dst, src_stat).await
    }
}
