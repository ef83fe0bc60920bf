//! Shared bincode configuration for everything that crosses the cache
//! boundary.

use bincode::Options;

/// Hard upper bound for any bincode-encoded payload we will attempt to
/// deserialize from disk.
///
/// Cache corruption should degrade to a cache miss, not an out-of-memory
/// crash: a corrupted length prefix must not be able to request an enormous
/// allocation.
pub const BINCODE_PAYLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/// The encoding used for all persisted values: fixed-width integers,
/// little-endian. Fixed so that cache files are byte-stable across platforms.
pub fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// [`bincode_options`] with the payload limit applied; use this for every
/// deserialization of bytes read from disk.
pub fn bincode_options_limited() -> impl Options {
    bincode_options().with_limit(BINCODE_PAYLOAD_LIMIT_BYTES as u64)
}
