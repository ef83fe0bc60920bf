//! The loader seam: package specs and loaded packages.
//!
//! The runner never loads or type-checks source itself. A [`PackageLoader`]
//! materializes the package graph from patterns and, for each package the
//! runner actually has to analyze, produces the loaded representation.

use std::sync::Arc;

use lintra_cache::ActionId;
use lintra_core::sem;
use lintra_core::{Config, FileSet};

/// An error produced by the loader, either for the whole graph computation
/// or for an individual package.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct LoadError {
    message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A package as known to the package graph, before loading.
#[derive(Debug)]
pub struct PackageSpec {
    /// Stable identifier, unique within one graph.
    pub id: String,
    /// Import path.
    pub path: String,
    /// Content hash covering all source inputs of the package.
    pub hash: ActionId,
    /// Direct dependencies. The loader guarantees these form a DAG and
    /// contain only analyzable packages.
    pub imports: Vec<Arc<PackageSpec>>,
    /// Per-package configuration fragment, merged over the runner's base
    /// configuration.
    pub config: Config,
    /// Errors encountered while computing the graph. A package with errors
    /// is never loaded or analyzed.
    pub errors: Vec<LoadError>,
}

/// The loaded representation of one package: sources and semantic shape.
pub struct LoadedPackage {
    pub spec: Arc<PackageSpec>,
    pub files: FileSet,
    pub types: Arc<sem::Package>,
    /// Errors encountered while loading or type-checking. A package with
    /// load errors fails without being analyzed, but the run continues.
    pub errors: Vec<LoadError>,
}

pub trait PackageLoader: Send + Sync {
    /// Materializes the package graph matched by `patterns`, returning the
    /// requested top-level packages.
    fn graph(&self, patterns: &[String]) -> Result<Vec<Arc<PackageSpec>>, LoadError>;

    /// Loads one package for analysis.
    fn load(&self, spec: &PackageSpec) -> Result<LoadedPackage, LoadError>;
}
