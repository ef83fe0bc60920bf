//! The analyzer contract.
//!
//! An [`Analyzer`] is one named static analysis. Analyzers declare the
//! analyzers they require, the fact types they produce, and a `run` entry
//! point that receives a [`Pass`] scoped to a single package. The runner owns
//! scheduling, caching, and fact propagation; analyzers only ever see the
//! current package and the facts their dependencies exported.

pub mod diagnostic;
pub mod directive;
pub mod fact;
pub mod pass;
pub mod unused;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use diagnostic::{Diagnostic, RelatedInformation, SuggestedFix, TextEdit};
pub use fact::{register_fact_type, registered_fact_type, Fact, FactError, FactType};
pub use pass::{ObjectFactView, PackageFactView, Pass};

/// The opaque value an analyzer produces for consumption by the analyzers
/// that require it.
pub type AnalyzerResult = Box<dyn Any + Send + Sync>;

/// An error returned from an analyzer's `run`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AnalyzerError {
    message: String,
}

impl AnalyzerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for AnalyzerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for AnalyzerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// One static analysis.
///
/// `name` must be unique within a run; it doubles as the analyzer's identity
/// in cache keys and in [`Pass::result_of`] lookups. The `requires` relation
/// must form a DAG.
pub trait Analyzer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn doc(&self) -> &'static str {
        ""
    }

    /// Analyzers whose results this analyzer consumes via
    /// [`Pass::result_of`]. They run before this analyzer within the same
    /// package.
    fn requires(&self) -> Vec<Arc<dyn Analyzer>> {
        Vec::new()
    }

    /// The fact types this analyzer may export. An analyzer that declares no
    /// fact types is skipped entirely when a package is analyzed only as a
    /// dependency.
    fn fact_types(&self) -> Vec<FactType> {
        Vec::new()
    }

    /// Receives the language target version (`"1.<minor>"`) before a run
    /// starts. The default ignores it.
    fn set_lang_version(&self, _version: &str) {}

    fn run(&self, pass: &mut dyn Pass) -> Result<AnalyzerResult, AnalyzerError>;
}

impl fmt::Debug for dyn Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Analyzer({})", self.name())
    }
}
