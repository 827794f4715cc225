//! YAML error diagnostics for snapshot, event and config files

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

/// YAML syntax or shape error with source location
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(catsync::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    message: String,
}

impl YamlSyntaxError {
    /// Create a syntax error from a serde_yml error
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        let offset = line_col_to_offset(source, line, column);
        let message = err.to_string();
        let help = suggest(&message);

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1)),
            help,
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while loading a YAML input file
#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("Failed to read {path}: {source}")]
    #[diagnostic(code(catsync::yaml::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid content in {path}: {message}")]
    #[diagnostic(code(catsync::yaml::invalid))]
    Invalid { path: String, message: String },
}

/// Read and deserialize a YAML file, mapping parse failures to a located diagnostic
pub fn parse_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T, YamlError> {
    let filename = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| YamlError::Io {
        path: filename.clone(),
        source,
    })?;
    parse_yaml_str(&contents, &filename)
}

/// Deserialize YAML text, naming it `filename` in diagnostics
pub fn parse_yaml_str<T: DeserializeOwned>(contents: &str, filename: &str) -> Result<T, YamlError> {
    serde_yml::from_str(contents)
        .map_err(|e| YamlError::Syntax(YamlSyntaxError::from_serde_error(&e, contents, filename)))
}

/// Convert a 1-based line/column to a byte offset
fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    let mut line_start = 0;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let within = text
                .char_indices()
                .nth(column.saturating_sub(1))
                .map(|(i, _)| i)
                .unwrap_or(text.len().saturating_sub(1));
            return line_start + within;
        }
        line_start += text.len();
    }
    source.len().saturating_sub(1)
}

/// Hints for the mistakes most often seen in hand-written snapshots and events
fn suggest(message: &str) -> Option<String> {
    let msg = message.to_lowercase();

    if msg.contains("unknown variant") {
        return Some(
            "Events are tagged with `event:`; valid values are entity_added, entity_updated, \
             entity_deleted, link_added, link_updated, link_deleted, field_set_updated, \
             specification_field_changed and publish"
                .to_string(),
        );
    }

    if msg.contains("missing field") {
        return Some("A required key is missing; check the key names and indentation".to_string());
    }

    if msg.contains("invalid type") && msg.contains("u32") {
        return Some("Entity ids are unsigned integers, e.g. `id: 42`".to_string());
    }

    if msg.contains("tab") {
        return Some(
            "YAML requires spaces for indentation, not tabs. Replace tabs with spaces.".to_string(),
        );
    }

    if msg.contains("duplicate key") {
        return Some("Each key can only appear once. Remove or rename the duplicate key.".to_string());
    }

    if msg.contains("mapping values are not allowed") {
        return Some("You may be missing a space after ':' or have incorrect indentation.".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_to_offset() {
        let source = "line1\nline2\nline3";
        assert_eq!(line_col_to_offset(source, 1, 1), 0);
        assert_eq!(line_col_to_offset(source, 2, 1), 6);
        assert_eq!(line_col_to_offset(source, 3, 2), 13);
    }

    #[test]
    fn test_suggestions() {
        assert!(suggest("unknown variant `entity_moved`").is_some());
        assert!(suggest("missing field `channel`").is_some());
        assert!(suggest("found tab character").is_some());
        assert!(suggest("some random error").is_none());
    }

    #[test]
    fn test_parse_yaml_str_reports_location() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Doc {
            id: u32,
        }
        let err = parse_yaml_str::<Doc>("id: nope\n", "doc.yaml").unwrap_err();
        assert!(matches!(err, YamlError::Syntax(_)));
    }

    #[test]
    fn test_parse_yaml_file_missing() {
        let err = parse_yaml_file::<serde_yml::Value>(Path::new("/no/such/file.yaml")).unwrap_err();
        assert!(matches!(err, YamlError::Io { .. }));
    }
}
