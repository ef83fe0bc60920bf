//! Facts and the process-global fact-type registry.
//!
//! A fact is an analyzer-defined datum about an object or a package, intended
//! for consumption by dependent packages. Facts cross the cache boundary, so
//! every fact type carries a stable canonical name and must be registered
//! before any serialization occurs; the registry is what turns a name read
//! from a cached stream back into a typed value.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use bincode::Options;
use lintra_core::codec::{bincode_options, bincode_options_limited};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FactError {
    #[error("failed encoding fact: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed decoding fact: {0}")]
    Decode(#[source] bincode::Error),
}

/// An analyzer-produced datum about an object or a package.
///
/// Implementations are plain serde types; `type_name` must return the same
/// canonical name the corresponding [`FactType`] is registered under.
pub trait Fact: Any + Send + Sync + fmt::Debug {
    /// Canonical name identifying this fact type in cached streams.
    fn type_name(&self) -> &'static str;

    fn encode(&self) -> Result<Vec<u8>, FactError>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Fact {
    /// Typed view of a fact; the read-side counterpart of the erased storage.
    pub fn downcast_ref<T: Fact>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Encodes a fact payload with the shared cache encoding. Intended for use
/// from [`Fact::encode`] implementations.
pub fn encode_fact<T: Serialize>(fact: &T) -> Result<Vec<u8>, FactError> {
    bincode_options().serialize(fact).map_err(FactError::Encode)
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Fact>, FactError>;

/// A registerable fact type: its canonical name plus a decoder for payloads
/// read back from the cache.
#[derive(Clone, Copy)]
pub struct FactType {
    pub name: &'static str,
    pub decode: DecodeFn,
}

impl FactType {
    pub fn of<T>(name: &'static str) -> Self
    where
        T: Fact + DeserializeOwned,
    {
        Self {
            name,
            decode: |bytes| {
                let fact: T = bincode_options_limited()
                    .deserialize(bytes)
                    .map_err(FactError::Decode)?;
                Ok(Box::new(fact))
            },
        }
    }
}

impl fmt::Debug for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactType({})", self.name)
    }
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, FactType>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a fact type by its canonical name.
///
/// Registration is idempotent: registering a name that is already present
/// keeps the existing entry. The registry is process-global and never
/// cleared; runs sharing a process share it.
pub fn register_fact_type(fact_type: FactType) {
    let mut registry = REGISTRY.write().unwrap_or_else(|err| err.into_inner());
    registry.entry(fact_type.name).or_insert(fact_type);
}

/// Looks up a registered fact type by name. Unregistered names are simply
/// unknown; a cached stream mentioning one is skipped, not an error.
pub fn registered_fact_type(name: &str) -> Option<FactType> {
    let registry = REGISTRY.read().unwrap_or_else(|err| err.into_inner());
    registry.get(name).copied()
}
