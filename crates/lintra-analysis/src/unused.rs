//! Result types for the `unused` analyzer.
//!
//! The `unused` analysis produces a structured result that the runner
//! persists separately from ordinary diagnostics: downstream consumers merge
//! used/unused sets across packages before deciding what to report. The
//! runner recognizes the analyzer by name; keeping these types here keeps
//! that boundary narrow.

use std::sync::Arc;

use lintra_core::sem::{Object, ObjectKind};
use lintra_core::{FileSet, SourcePosition};
use serde::{Deserialize, Serialize};

/// The name the runner recognizes the unused analyzer by.
pub const UNUSED_ANALYZER_NAME: &str = "unused";

/// The raw result of the unused analysis, over live semantic objects.
#[derive(Clone, Debug, Default)]
pub struct UnusedResult {
    pub used: Vec<Arc<Object>>,
    pub unused: Vec<Arc<Object>>,
}

/// One object in serialized form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedObject {
    pub name: String,
    pub kind: ObjectKind,
    pub position: Option<SourcePosition>,
}

/// The unused result with all object references resolved to positions, as
/// persisted to the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedUnusedResult {
    pub used: Vec<SerializedObject>,
    pub unused: Vec<SerializedObject>,
}

/// Resolves a raw result against the file set of the package it was produced
/// from.
pub fn serialize_unused(result: &UnusedResult, files: &FileSet) -> SerializedUnusedResult {
    let serialize = |objects: &[Arc<Object>]| {
        objects
            .iter()
            .map(|obj| SerializedObject {
                name: obj.name.clone(),
                kind: obj.kind,
                position: obj.span.map(|span| files.position(span.file, span.start)),
            })
            .collect()
    };
    SerializedUnusedResult {
        used: serialize(&result.used),
        unused: serialize(&result.unused),
    }
}
