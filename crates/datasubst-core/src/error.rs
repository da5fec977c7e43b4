//! Unified error types for the datasubst pipeline.

use std::fmt;

use thiserror::Error;

/// All errors that can occur while loading data, narrowing it, and rendering a template.
#[derive(Error, Debug)]
pub enum DatasubstError {
    // --- Decode ---

    /// The JSON data source is malformed.
    #[error("failed to decode JSON data: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    /// The YAML data source is malformed.
    #[error("failed to decode YAML data: {source}")]
    Yaml {
        #[source]
        source: serde_yaml::Error,
    },

    /// The YAML data source contains no document at all.
    #[error("failed to decode YAML data: no document found")]
    EmptyYaml,

    // --- Subtree ---

    /// A subtree path segment could not be resolved.
    #[error("cannot resolve subtree path '{path}' at segment '{segment}': {reason}")]
    Subtree {
        path: String,
        segment: String,
        reason: String,
    },

    // --- Parse ---

    /// The delimiter spec is not of the form `LEFT:RIGHT`.
    #[error("invalid delimiters '{spec}': {reason}")]
    InvalidDelimiters { spec: String, reason: String },

    /// The template text is not valid UTF-8.
    #[error("template is not valid UTF-8")]
    TemplateEncoding(#[source] std::str::Utf8Error),

    /// The template text is syntactically invalid.
    #[error("template: {name}:{line}: {message}")]
    TemplateParse {
        name: String,
        line: usize,
        message: String,
    },

    // --- Render ---

    /// Execution of the template failed (strict missing key, bad function call, ...).
    #[error("template: {name}:{line}:{column}: executing \"{name}\" at <{context}>: {message}")]
    TemplateRender {
        name: String,
        line: usize,
        column: usize,
        context: String,
        message: String,
    },

    // --- Usage ---

    /// The combination of inputs is invalid.
    #[error("{0}")]
    Usage(String),

    // --- General ---

    /// A read or write on a caller-supplied handle failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse error taxonomy, for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Path,
    Parse,
    Render,
    Usage,
    Io,
}

impl DatasubstError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Json { .. } | Self::Yaml { .. } | Self::EmptyYaml => ErrorKind::Decode,
            Self::Subtree { .. } => ErrorKind::Path,
            Self::InvalidDelimiters { .. }
            | Self::TemplateEncoding(_)
            | Self::TemplateParse { .. } => ErrorKind::Parse,
            Self::TemplateRender { .. } => ErrorKind::Render,
            Self::Usage(_) => ErrorKind::Usage,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Position of a decode error as `(line, column)`, both 1-based, when the decoder reports one.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            Self::Json { source } if source.line() > 0 => Some((source.line(), source.column())),
            Self::Yaml { source } => source.location().map(|loc| (loc.line(), loc.column())),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Decode => "decode error",
            Self::Path => "path error",
            Self::Parse => "parse error",
            Self::Render => "render error",
            Self::Usage => "usage error",
            Self::Io => "I/O error",
        };
        f.write_str(name)
    }
}

/// Alias for `Result<T, DatasubstError>`.
pub type Result<T> = std::result::Result<T, DatasubstError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_location() {
        let err = serde_json::from_str::<serde_json::Value>("{\n  \"a\": }").unwrap_err();
        let err = DatasubstError::Json { source: err };
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.location().map(|(line, _)| line), Some(2));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(DatasubstError::EmptyYaml.kind(), ErrorKind::Decode);
        assert_eq!(DatasubstError::Usage("x".into()).kind(), ErrorKind::Usage);
        let err = DatasubstError::Subtree {
            path: ".a".into(),
            segment: "a".into(),
            reason: "key not found".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Path);
        assert!(err.location().is_none());
    }

    #[test]
    fn test_render_error_message() {
        let err = DatasubstError::TemplateRender {
            name: "template".into(),
            line: 1,
            column: 3,
            context: ".missing".into(),
            message: "map has no entry for key \"missing\"".into(),
        };
        assert_eq!(
            err.to_string(),
            "template: template:1:3: executing \"template\" at <.missing>: map has no entry for key \"missing\""
        );
    }
}
