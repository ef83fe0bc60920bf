//! Shared, dependency-minimized core types used across lintra.

pub mod codec;
pub mod config;
pub mod files;
pub mod sem;
pub mod text;

/// The current lintra version.
///
/// Used for on-disk cache compatibility checks.
pub const LINTRA_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::Config;
pub use files::{FileId, FileSet, SourceFile, SourcePosition, Span};
pub use text::{LineCol, LineIndex};
