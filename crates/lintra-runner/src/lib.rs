//! The analysis runner.
//!
//! A [`Runner`] maps a set of analyzers and package patterns to a list of
//! [`AnalysisResult`]s. Results give access to diagnostics, directives,
//! errors, and information about packages; they deliberately do not hold
//! syntax trees or semantic data. Everything that needs the loaded
//! representation of a package happens inside analyzers, and every position
//! that leaves the runner is fully resolved.
//!
//! # Planning and execution
//!
//! Analyzing packages happens in two phases. Planning materializes the full
//! package dependency graph as an action graph, so execution can proceed from
//! the leaves up without a depth-first search holding data alive. During
//! execution, ready actions run in parallel, bounded by a semaphore sized to
//! the logical CPU count. Nodes know their dependents: the last dependency of
//! a node to finish schedules that node. The graph is rooted at a synthetic
//! root action; dequeueing the root terminates the run.
//!
//! Analyzing a single package repeats the same planning + execution steps on
//! the graph of analyzers for that package, bounded by the same semaphore,
//! with the twist that a package can always run at least one analyzer inline
//! under its own permit, so progress is guaranteed no matter how the permits
//! are distributed.
//!
//! # Caching
//!
//! The runner stores facts, directives, and diagnostics in a
//! content-addressed on-disk cache ([`lintra_cache`]). Caching is as much
//! about memory as it is about speed: once a package is analyzed, its results
//! are dropped from memory and reloaded from disk when a dependent (or the
//! final report) needs them. A dependency may be read many times over, but
//! nothing is pinned in memory on the chance that it may be needed again.

mod analyzers;
mod error;
mod facts_io;
mod graph;
mod loader;
mod package;
mod result;
mod runner;
mod semaphore;
mod stats;

pub use error::RunnerError;
pub use loader::{LoadError, LoadedPackage, PackageLoader, PackageSpec};
pub use result::{AnalysisResult, Diagnostic, RelatedInformation, SuggestedFix, TextEdit};
pub use runner::{Runner, RunnerOptions};
pub use stats::{Stats, StatsSnapshot, RunnerState};
