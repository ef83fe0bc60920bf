use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Width of an [`ActionId`] in bytes.
pub const ACTION_ID_LEN: usize = 32;

/// A fixed-width digest addressing one cache entry.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId([u8; ACTION_ID_LEN]);

impl ActionId {
    pub const fn from_bytes(bytes: [u8; ACTION_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACTION_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derives the id of one artifact kind produced under this action.
    ///
    /// Derivation is deterministic and collision-free across kinds: two
    /// distinct kind tags of the same parent never map to the same entry.
    pub fn subkey(&self, kind: &str) -> ActionId {
        let mut hasher = Sha256::new();
        hasher.update(b"subkey");
        hasher.update(self.0);
        hasher.update(kind.as_bytes());
        ActionId(hasher.finalize().into())
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({})", self.to_hex())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subkeys_are_deterministic_and_distinct_per_kind() {
        let parent = ActionId::from_bytes([7; ACTION_ID_LEN]);
        assert_eq!(parent.subkey("vetx"), parent.subkey("vetx"));
        assert_ne!(parent.subkey("vetx"), parent.subkey("diagnostics"));
        assert_ne!(parent.subkey("vetx"), parent.subkey("directives"));
        assert_ne!(parent.subkey("vetx"), parent);
    }

    #[test]
    fn hex_is_lowercase_and_full_width() {
        let id = ActionId::from_bytes([0xAB; ACTION_ID_LEN]);
        assert_eq!(id.to_hex(), "ab".repeat(ACTION_ID_LEN));
    }
}
