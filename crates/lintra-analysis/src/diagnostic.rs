//! Diagnostics as produced by analyzers, in raw span form.
//!
//! These carry [`Span`]s into the current package's file set; the runner
//! resolves them to file/line/column positions before anything is persisted.

use lintra_core::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub span: Span,
    /// Check identifier; an empty category is stamped with the reporting
    /// analyzer's name.
    pub category: String,
    pub message: String,
    pub suggested_fixes: Vec<SuggestedFix>,
    pub related: Vec<RelatedInformation>,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            category: String::new(),
            message: message.into(),
            suggested_fixes: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// A proposed remediation attached to a diagnostic.
#[derive(Clone, Debug, PartialEq)]
pub struct SuggestedFix {
    pub message: String,
    pub edits: Vec<TextEdit>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextEdit {
    pub span: Span,
    pub new_text: String,
}

/// Additional context for a diagnostic, pointing at another location.
#[derive(Clone, Debug, PartialEq)]
pub struct RelatedInformation {
    pub span: Span,
    pub message: String,
}
