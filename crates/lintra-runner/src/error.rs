use lintra_analysis::{AnalyzerError, FactError};
use lintra_cache::CacheError;

use crate::loader::LoadError;

/// Errors recorded on actions and surfaced through
/// [`AnalysisResult::errors`](crate::AnalysisResult::errors).
///
/// [`Runner::run`](crate::Runner::run) itself only ever returns the `Load`
/// variant, for a failure to compute the package graph; everything else is
/// per-package and does not abort the run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed loading packages: {0}")]
    Load(#[from] LoadError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("fact error: {0}")]
    Fact(#[from] FactError),

    #[error("analyzer {analyzer} failed: {source}")]
    Analyzer {
        analyzer: &'static str,
        #[source]
        source: AnalyzerError,
    },

    #[error("analyzer dependency cycle involving {analyzer}")]
    AnalyzerCycle { analyzer: &'static str },

    #[error("analysis worker panicked")]
    Panicked,

    #[error("analyzer {analyzer} did not produce the expected result type")]
    UnexpectedResultType { analyzer: &'static str },
}
