//! Content-addressed on-disk cache for analysis artifacts.
//!
//! Entries are immutable blobs addressed by an [`ActionId`] (a SHA-256
//! digest). The runner derives one action id per unit of work, then derives
//! [`ActionId::subkey`]s from it to distinguish the artifact kinds one action
//! produces. Writes are atomic (tmp-then-rename), so a cache shared between
//! concurrent runs never exposes partially written entries.

mod cache;
mod error;
mod hash;
mod id;

pub use cache::{Cache, EntryMeta};
pub use error::{CacheError, Result};
pub use hash::{file_digest, KeyHasher};
pub use id::{ActionId, ACTION_ID_LEN};
