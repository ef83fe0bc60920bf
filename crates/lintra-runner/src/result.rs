//! Per-package results and their lazily loaded artifacts.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bincode::Options;
use lintra_analysis::directive::SerializedDirective;
use lintra_analysis::unused::SerializedUnusedResult;
use lintra_core::codec::bincode_options_limited;
use lintra_core::{FileSet, SourcePosition};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::loader::PackageSpec;

/// A diagnostic with fully resolved positions, as persisted to the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub position: SourcePosition,
    pub end: SourcePosition,
    pub category: String,
    pub message: String,
    pub suggested_fixes: Vec<SuggestedFix>,
    pub related: Vec<RelatedInformation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub message: String,
    pub edits: Vec<TextEdit>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub position: SourcePosition,
    pub end: SourcePosition,
    pub new_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedInformation {
    pub position: SourcePosition,
    pub end: SourcePosition,
    pub message: String,
}

impl Diagnostic {
    /// Resolves a raw analyzer diagnostic against the file set it was
    /// reported in. No unresolved span survives past this point.
    pub(crate) fn resolve(raw: &lintra_analysis::Diagnostic, files: &FileSet) -> Self {
        let (position, end) = files.resolve(raw.span);
        Self {
            position,
            end,
            category: raw.category.clone(),
            message: raw.message.clone(),
            suggested_fixes: raw
                .suggested_fixes
                .iter()
                .map(|fix| SuggestedFix {
                    message: fix.message.clone(),
                    edits: fix
                        .edits
                        .iter()
                        .map(|edit| {
                            let (position, end) = files.resolve(edit.span);
                            TextEdit {
                                position,
                                end,
                                new_text: edit.new_text.clone(),
                            }
                        })
                        .collect(),
                })
                .collect(),
            related: raw
                .related
                .iter()
                .map(|rel| {
                    let (position, end) = files.resolve(rel.span);
                    RelatedInformation {
                        position,
                        end,
                        message: rel.message.clone(),
                    }
                })
                .collect(),
        }
    }
}

/// The result of analyzing a single package.
///
/// Holds references to cached artifacts, not the artifacts themselves; the
/// loaders below read them back from disk on demand. A package analyzed only
/// as a dependency has no diagnostics, directives, or unused artifacts, and
/// its loaders return empty values.
pub struct AnalysisResult {
    pub package: Arc<PackageSpec>,
    /// The merged configuration the package was analyzed under.
    pub config: lintra_core::Config,
    pub failed: bool,
    pub errors: Vec<RunnerError>,
    diagnostics: Option<PathBuf>,
    directives: Option<PathBuf>,
    unused: Option<PathBuf>,
}

impl AnalysisResult {
    pub(crate) fn new(
        package: Arc<PackageSpec>,
        config: lintra_core::Config,
        failed: bool,
        errors: Vec<RunnerError>,
        diagnostics: Option<PathBuf>,
        directives: Option<PathBuf>,
        unused: Option<PathBuf>,
    ) -> Self {
        Self {
            package,
            config,
            failed,
            errors,
            diagnostics,
            directives,
            unused,
        }
    }

    /// Path of the cached diagnostics artifact, if any.
    pub fn diagnostics_path(&self) -> Option<&Path> {
        self.diagnostics.as_deref()
    }

    /// Path of the cached directives artifact, if any.
    pub fn directives_path(&self) -> Option<&Path> {
        self.directives.as_deref()
    }

    /// Path of the cached unused artifact, if any.
    pub fn unused_path(&self) -> Option<&Path> {
        self.unused.as_deref()
    }

    /// Loads the diagnostics found while analyzing the package.
    ///
    /// # Panics
    ///
    /// Panics when called on a failed result.
    pub fn diagnostics(&self) -> Result<Vec<Diagnostic>, RunnerError> {
        assert!(!self.failed, "diagnostics called on a failed result");
        let Some(path) = self.diagnostics.as_ref() else {
            // This package was only a dependency.
            return Ok(Vec::new());
        };
        let mut reader = BufReader::new(File::open(path)?);
        let mut out = Vec::new();
        loop {
            if reader.fill_buf()?.is_empty() {
                break;
            }
            let diagnostic: Diagnostic = bincode_options_limited().deserialize_from(&mut reader)?;
            out.push(diagnostic);
        }
        Ok(out)
    }

    /// Loads the directives found while analyzing the package.
    ///
    /// # Panics
    ///
    /// Panics when called on a failed result.
    pub fn directives(&self) -> Result<Vec<SerializedDirective>, RunnerError> {
        assert!(!self.failed, "directives called on a failed result");
        let Some(path) = self.directives.as_ref() else {
            return Ok(Vec::new());
        };
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode_options_limited().deserialize_from(reader)?)
    }

    /// Loads the unused-analysis result for the package.
    ///
    /// # Panics
    ///
    /// Panics when called on a failed result.
    pub fn unused(&self) -> Result<SerializedUnusedResult, RunnerError> {
        assert!(!self.failed, "unused called on a failed result");
        let Some(path) = self.unused.as_ref() else {
            return Ok(SerializedUnusedResult::default());
        };
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode_options_limited().deserialize_from(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lintra_core::Span;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve_covers_fixes_and_related_information() {
        let mut files = FileSet::new();
        let file = files.add("pkg/a.x", "fn f() {}\nfn g() {}\n");

        let raw = lintra_analysis::Diagnostic {
            span: Span::new(file, 3, 4),
            category: "SA0001".to_string(),
            message: "bad f".to_string(),
            suggested_fixes: vec![lintra_analysis::SuggestedFix {
                message: "rename".to_string(),
                edits: vec![lintra_analysis::TextEdit {
                    span: Span::new(file, 13, 14),
                    new_text: "h".to_string(),
                }],
            }],
            related: vec![lintra_analysis::RelatedInformation {
                span: Span::new(file, 10, 12),
                message: "see g".to_string(),
            }],
        };

        let resolved = Diagnostic::resolve(&raw, &files);
        assert_eq!((resolved.position.line, resolved.position.column), (1, 4));
        assert_eq!(resolved.category, "SA0001");
        let edit = &resolved.suggested_fixes[0].edits[0];
        assert_eq!((edit.position.line, edit.position.column), (2, 4));
        assert_eq!(resolved.related[0].message, "see g");
        assert_eq!((resolved.related[0].position.line, resolved.related[0].position.column), (2, 1));
    }
}
