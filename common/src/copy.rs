use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::filecmp::{self, FileStat, Staleness};

/// Outcome of a diff check: the source stat and why the destination is stale, if it is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Diff {
    pub src_stat: FileStat,
    pub staleness: Option<Staleness>,
}

impl Diff {
    #[must_use]
    pub fn needs_copy(&self) -> bool {
        self.staleness.is_some()
    }
}

/// Single-file diff and copy. Has no concurrency of its own, the worker pool drives it.
#[async_trait::async_trait]
pub trait CopyEngine: Send + Sync {
    /// Compares `src` against `dst`. Failing to stat `src` is an error, failing to stat `dst`
    /// means the destination is missing.
    async fn diff_check(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
    ) -> anyhow::Result<Diff>;

    /// Copies `src` over `dst` and returns the number of bytes written.
    async fn copy(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
        src_stat: &FileStat,
    ) -> anyhow::Result<u64>;
}

/// Copy engine backed by the local filesystem.
#[derive(Debug, Default, Copy, Clone)]
pub struct FsEngine;

#[async_trait::async_trait]
impl CopyEngine for FsEngine {
    #[instrument(skip(self))]
    async fn diff_check(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
    ) -> anyhow::Result<Diff> {
        let src_metadata = tokio::fs::metadata(src)
            .await
            .with_context(|| format!("failed reading metadata from {src:?}"))?;
        let src_stat = FileStat::from_metadata(&src_metadata)
            .with_context(|| format!("failed reading modification time of {src:?}"))?;
        let dst_stat = match tokio::fs::metadata(dst).await {
            Ok(metadata) => FileStat::from_metadata(&metadata).ok(),
            Err(error) => {
                tracing::debug!("cannot stat 'dst', treating as missing: {}", error);
                None
            }
        };
        let staleness = filecmp::staleness(&src_stat, dst_stat.as_ref());
        tracing::debug!("diff: {:?}", staleness);
        Ok(Diff {
            src_stat,
            staleness,
        })
    }

    #[instrument(skip(self))]
    async fn copy(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
        src_stat: &FileStat,
    ) -> anyhow::Result<u64> {
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create directory {parent:?}"))?;
        }
        tracing::debug!("opening 'src' for reading and 'dst' for writing");
        let mut reader = tokio::fs::File::open(src)
            .await
            .with_context(|| format!("cannot open {src:?} for reading"))?;
        // a partially written 'dst' is left behind on failure, the next attempt truncates it
        let mut writer = tokio::fs::File::create(dst)
            .await
            .with_context(|| format!("cannot open {dst:?} for writing"))?;
        tracing::debug!("copying data");
        let bytes = tokio::io::copy(&mut reader, &mut writer)
            .await
            .with_context(|| format!("failed copying {src:?} to {dst:?}"))?;
        writer
            .flush()
            .await
            .with_context(|| format!("failed flushing {dst:?}"))?;
        drop(writer);
        tracing::debug!("setting timestamps");
        let mtime = filetime::FileTime::from_system_time(src_stat.mtime);
        let dst_owned = dst.to_owned();
        tokio::task::spawn_blocking(move || filetime::set_file_times(&dst_owned, mtime, mtime))
            .await?
            .with_context(|| format!("failed setting timestamps for {dst:?}"))?;
        Ok(bytes)
    }
}
