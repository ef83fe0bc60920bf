use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CacheError, Result};
use crate::id::ActionId;

/// Distinguishes the temp files of concurrent writers within one process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Metadata about a cache entry returned alongside its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    pub size: u64,
}

/// A content-addressed store of immutable blobs on disk.
///
/// One file per entry, named by the hex form of its [`ActionId`] and sharded
/// under a two-hex-digit prefix directory to keep directory sizes bounded.
/// Entries are never mutated in place; a `put_bytes` of an id that already
/// exists replaces the file atomically with identical content, so paths
/// handed out by [`Cache::get_file`] remain valid for their lifetime. The
/// store may be shared between concurrent processes.
#[derive(Clone, Debug)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Opens (creating if necessary) a cache rooted at an explicit directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Opens the per-user default cache, honoring `LINTRA_CACHE` as an
    /// override.
    pub fn open_default() -> Result<Self> {
        Self::open(default_root()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durably stores `bytes` under `id`, returning the entry's path.
    pub fn put_bytes(&self, id: ActionId, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.entry_path(id);
        write_entry(&path, bytes)?;
        Ok(path)
    }

    /// Looks up an entry, returning a path that may be opened read-only.
    ///
    /// Anything that prevents using the entry (absence, an unexpected file
    /// type, an unreadable directory) is a miss: the caller recomputes and
    /// rewrites, which also repairs a damaged entry.
    pub fn get_file(&self, id: ActionId) -> Option<(PathBuf, EntryMeta)> {
        let path = self.entry_path(id);
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::debug!(
                    target = "lintra.cache",
                    path = %path.display(),
                    error = %err,
                    "failed to stat cache entry; treating as miss"
                );
                return None;
            }
        };
        if !meta.is_file() {
            tracing::debug!(
                target = "lintra.cache",
                path = %path.display(),
                "cache entry is not a regular file; treating as miss"
            );
            return None;
        }
        Some((path, EntryMeta { size: meta.len() }))
    }

    fn entry_path(&self, id: ActionId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }
}

/// Writes one entry through a writer-private temp file and a rename, so no
/// reader (here or in another process sharing the cache) can observe a
/// partial entry.
fn write_entry(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .expect("entry paths always have a shard directory");
    fs::create_dir_all(dir)?;

    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!("put.{}.{seq}.tmp", std::process::id()));

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            // Entries are content-addressed, so a rename refused because the
            // destination exists (as on Windows) means a concurrent writer
            // stored these exact bytes first. That is success, not a
            // conflict worth retrying.
            if path.is_file() {
                Ok(())
            } else {
                Err(CacheError::from(err))
            }
        }
    }
}

fn default_root() -> Result<PathBuf> {
    if let Some(root) = std::env::var_os("LINTRA_CACHE") {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }
    if let Some(dir) = std::env::var_os("XDG_CACHE_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir).join("lintra"));
        }
    }
    if let Some(home) = std::env::var_os("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home).join(".cache").join("lintra"));
        }
    }
    Err(CacheError::MissingCacheDir)
}
