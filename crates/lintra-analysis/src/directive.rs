//! In-source directives.
//!
//! A directive is a `//lint:<command> [args…]` comment marker. Parsing is
//! purely lexical: any line containing the marker yields a directive, with
//! the span covering the marker through the end of the line.

use lintra_core::{FileSet, SourcePosition, Span};
use serde::{Deserialize, Serialize};

const DIRECTIVE_MARKER: &str = "//lint:";

/// A parsed directive, in raw span form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub command: String,
    pub arguments: Vec<String>,
    pub span: Span,
}

/// A directive with its position resolved, as persisted to the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDirective {
    pub command: String,
    pub arguments: Vec<String>,
    pub position: SourcePosition,
}

/// Scans every file in the set for directive markers.
pub fn parse_directives(files: &FileSet) -> Vec<Directive> {
    let mut out = Vec::new();
    for file in files.iter() {
        let text = file.text();
        let mut line_start = 0usize;
        for line in text.split_inclusive('\n') {
            if let Some(marker) = line.find(DIRECTIVE_MARKER) {
                let rest = line[marker + DIRECTIVE_MARKER.len()..].trim_end_matches('\n');
                let mut words = rest.split_whitespace();
                if let Some(command) = words.next() {
                    let start = (line_start + marker) as u32;
                    let end = (line_start + line.trim_end_matches('\n').len()) as u32;
                    out.push(Directive {
                        command: command.to_string(),
                        arguments: words.map(|w| w.to_string()).collect(),
                        span: Span::new(file.id(), start, end),
                    });
                }
            }
            line_start += line.len();
        }
    }
    out
}

/// Resolves a directive's span against the file set it was parsed from.
pub fn serialize_directive(directive: &Directive, files: &FileSet) -> SerializedDirective {
    SerializedDirective {
        command: directive.command.clone(),
        arguments: directive.arguments.clone(),
        position: files.position(directive.span.file, directive.span.start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_commands_and_arguments() {
        let mut files = FileSet::new();
        files.add(
            "pkg/a.x",
            "fn f() {}\n//lint:ignore SA1000 reason goes here\nfn g() {} //lint:file-ignored\n",
        );

        let directives = parse_directives(&files);
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].command, "ignore");
        assert_eq!(
            directives[0].arguments,
            vec!["SA1000".to_string(), "reason".to_string(), "goes".to_string(), "here".to_string()]
        );
        assert_eq!(directives[1].command, "file-ignored");
        assert!(directives[1].arguments.is_empty());
    }

    #[test]
    fn marker_without_command_is_not_a_directive() {
        let mut files = FileSet::new();
        files.add("pkg/a.x", "//lint:   \n");
        assert!(parse_directives(&files).is_empty());
    }

    #[test]
    fn serialization_resolves_positions() {
        let mut files = FileSet::new();
        files.add("pkg/a.x", "fn f() {}\n  //lint:ignore X y\n");

        let directives = parse_directives(&files);
        let serialized = serialize_directive(&directives[0], &files);
        assert_eq!(
            serialized,
            SerializedDirective {
                command: "ignore".to_string(),
                arguments: vec!["X".to_string(), "y".to_string()],
                position: SourcePosition {
                    file: "pkg/a.x".to_string(),
                    line: 2,
                    column: 3,
                },
            }
        );
    }
}
