use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::id::ActionId;

/// A streaming builder for cache keys.
///
/// The salt separates key spaces: callers seed it with their tool identity
/// and the unit of work (e.g. the package path), then fold newline-terminated
/// text records describing every input that must invalidate the key when it
/// changes.
pub struct KeyHasher {
    inner: Sha256,
}

impl KeyHasher {
    pub fn new(salt: &str) -> Self {
        let mut inner = Sha256::new();
        inner.update(salt.as_bytes());
        inner.update(b"\n");
        Self { inner }
    }

    /// Folds one newline-terminated text record into the key.
    pub fn line(&mut self, text: &str) {
        self.inner.update(text.as_bytes());
        self.inner.update(b"\n");
    }

    pub fn finish(self) -> ActionId {
        ActionId::from_bytes(self.inner.finalize().into())
    }
}

/// Content-hashes a file already on disk.
///
/// Used to fold a dependency's serialized outputs into a dependent's cache
/// key: the dependency may have hit its own cache, so the actual bytes on
/// disk are what matters, not how they were produced.
pub fn file_digest(path: impl AsRef<Path>) -> Result<ActionId> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(ActionId::from_bytes(hasher.finalize().into()))
}
