use tracing::instrument;

/// Size and modification time of a file, read fresh at diff-check time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: std::time::SystemTime,
}

impl FileStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            mtime: metadata.modified()?,
        })
    }
}

/// Reason a destination is considered stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Staleness {
    DstMissing,
    SizeDiffers,
    SrcNewer,
}

/// Decides whether `dst` must be rewritten from `src`. Only size and mtime are compared, a
/// destination that is newer than (or as new as) the source with the same size is kept even if
/// its content differs.
#[instrument]
pub fn staleness(src: &FileStat, dst: Option<&FileStat>) -> Option<Staleness> {
    let Some(dst) = dst else {
        return Some(Staleness::DstMissing);
    };
    if src.size != dst.size {
        return Some(Staleness::SizeDiffers);
    }
    if src.mtime > dst.mtime {
        return Some(Staleness::SrcNewer);
    }
    None
}
