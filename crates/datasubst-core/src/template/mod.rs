//! Go `text/template` compatible templates.
//!
//! A [`Template`] is parsed once from UTF-8 text with a pair of
//! [`Delimiters`] and then rendered against a [`Value`]. Parsing and
//! rendering errors carry the template name and source line, in the same
//! `template: NAME:LINE: ...` form that Go reports.
//!
//! ```
//! use datasubst_core::template::{Delimiters, MissingKeyPolicy, Template};
//! use datasubst_core::value::Value;
//!
//! let data: Value = [("name", "World")].into_iter().collect();
//! let tmpl = Template::parse("hello", "Hello {{ .name }}!", &Delimiters::default(), MissingKeyPolicy::Default).unwrap();
//! assert_eq!(tmpl.render(&data).unwrap(), "Hello World!");
//! ```

mod ast;
mod exec;
mod funcs;
mod lexer;
mod parser;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::error::{DatasubstError, Result};
use crate::value::Value;

const DEFAULT_LEFT: &str = "{{";
const DEFAULT_RIGHT: &str = "}}";

/// The strings that open and close an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    left: String,
    right: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            left: DEFAULT_LEFT.to_string(),
            right: DEFAULT_RIGHT.to_string(),
        }
    }
}

impl Delimiters {
    /// Both delimiters must be non-empty and distinct.
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Result<Self> {
        let (left, right) = (left.into(), right.into());
        let invalid = |reason: &str| DatasubstError::InvalidDelimiters {
            spec: format!("{left}:{right}"),
            reason: reason.to_string(),
        };
        if left.is_empty() || right.is_empty() {
            return Err(invalid("both delimiters must be non-empty"));
        }
        if left == right {
            return Err(invalid("left and right delimiters must differ"));
        }
        Ok(Self { left, right })
    }

    /// Parse a `LEFT:RIGHT` spec such as `((:))`.
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let mut parts = spec.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(left), Some(right), None) => Self::new(left, right),
            _ => Err(DatasubstError::InvalidDelimiters {
                spec: spec.to_string(),
                reason: "expected LEFT:RIGHT with exactly one ':'".into(),
            }),
        }
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }
}

impl FromStr for Delimiters {
    type Err = DatasubstError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_spec(s)
    }
}

impl fmt::Display for Delimiters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.left, self.right)
    }
}

/// What a field lookup does when the key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKeyPolicy {
    /// Absent keys evaluate to null and render as empty text.
    #[default]
    Default,
    /// Absent keys abort rendering with an error naming the key.
    Error,
}

/// A parsed template, including every `{{define}}` and `{{block}}` it contains.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    source: String,
    trees: parser::Trees,
    missing_key: MissingKeyPolicy,
}

impl Template {
    /// Parse template text.
    pub fn parse(
        name: impl Into<String>,
        source: impl Into<String>,
        delims: &Delimiters,
        missing_key: MissingKeyPolicy,
    ) -> Result<Self> {
        let name = name.into();
        let source = source.into();
        let trees = parser::parse(&name, &source, delims).map_err(|err| {
            DatasubstError::TemplateParse {
                name: name.clone(),
                line: line_and_column(&source, err.pos).0,
                message: err.message,
            }
        })?;
        tracing::debug!(template = %name, definitions = trees.len(), %delims, "parsed template");
        Ok(Self {
            name,
            source,
            trees,
            missing_key,
        })
    }

    /// Parse template bytes, which must be valid UTF-8.
    pub fn parse_bytes(
        name: impl Into<String>,
        source: &[u8],
        delims: &Delimiters,
        missing_key: MissingKeyPolicy,
    ) -> Result<Self> {
        let text = std::str::from_utf8(source).map_err(DatasubstError::TemplateEncoding)?;
        Self::parse(name, text, delims, missing_key)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn missing_key(&self) -> MissingKeyPolicy {
        self.missing_key
    }

    /// Names of all templates defined in the source, the main one included, sorted.
    pub fn defined_templates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trees.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render against `data` into a string.
    pub fn render(&self, data: &Value) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        exec::execute(self, data, &mut out).map_err(|err| {
            let (line, column) = line_and_column(&self.source, err.pos);
            DatasubstError::TemplateRender {
                name: err.name,
                line,
                column,
                context: err.context,
                message: err.message,
            }
        })?;
        tracing::debug!(template = %self.name, bytes = out.len(), "rendered template");
        Ok(out)
    }

    /// Render against `data` and write the result. Nothing is written if rendering fails.
    pub fn execute<W: Write>(&self, data: &Value, writer: &mut W) -> Result<()> {
        let rendered = self.render(data)?;
        writer.write_all(rendered.as_bytes())?;
        Ok(())
    }
}

/// 1-based line, and the byte column the way Go reports it: the offset from
/// the start of the line, or from the start of the text on the first line.
fn line_and_column(source: &str, pos: usize) -> (usize, usize) {
    let before = &source[..pos.min(source.len())];
    let line = 1 + before.matches('\n').count();
    let column = match before.rfind('\n') {
        Some(newline) => pos - (newline + 1),
        None => pos,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::loader::{load_bytes, DataFormat};

    fn render_with(src: &str, data: &str, policy: MissingKeyPolicy) -> Result<String> {
        let data = load_bytes(DataFormat::Json, data.as_bytes())?;
        Template::parse("test", src, &Delimiters::default(), policy)?.render(&data)
    }

    fn render(src: &str, data: &str) -> String {
        render_with(src, data, MissingKeyPolicy::Default).unwrap()
    }

    #[test]
    fn test_delimiter_spec() {
        let delims = Delimiters::parse_spec("((:))").unwrap();
        assert_eq!(delims.left(), "((");
        assert_eq!(delims.right(), "))");
        assert_eq!(delims.to_string(), "((:))");
        assert_eq!(Delimiters::default().to_string(), "{{:}}");
    }

    #[test]
    fn test_delimiter_spec_rejects() {
        for bad in ["((", "a:b:c", ":))", "((:", "[[:[["] {
            let err = Delimiters::parse_spec(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{bad}");
        }
    }

    #[test]
    fn test_hello_world() {
        assert_eq!(render("Hello {{ .name }}!", r#"{"name": "World"}"#), "Hello World!");
    }

    #[test]
    fn test_custom_delimiters_leave_default_markers_alone() {
        let delims = Delimiters::parse_spec("[[:]]").unwrap();
        let data: Value = [("a", "x")].into_iter().collect();
        let tmpl = Template::parse("t", "[[ .a ]] {{ .a }}", &delims, MissingKeyPolicy::Default).unwrap();
        assert_eq!(tmpl.render(&data).unwrap(), "x {{ .a }}");
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = Template::parse("page", "line one\n{{ .a ", &Delimiters::default(), MissingKeyPolicy::Default)
            .unwrap_err();
        assert_eq!(err.to_string(), "template: page:2: unclosed action");
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_strict_missing_key_error_format() {
        let err = render_with("a\n  {{ .missing }}", r#"{"present": 1}"#, MissingKeyPolicy::Error).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(
            err.to_string(),
            "template: test:2:5: executing \"test\" at <.missing>: map has no entry for key \"missing\""
        );
    }

    #[test]
    fn test_invalid_utf8_template() {
        let err = Template::parse_bytes("t", &[0xff, 0xfe], &Delimiters::default(), MissingKeyPolicy::Default)
            .unwrap_err();
        assert!(matches!(err, DatasubstError::TemplateEncoding(_)));
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_defined_templates() {
        let tmpl = Template::parse(
            "main",
            r#"{{define "b"}}B{{end}}{{define "a"}}A{{end}}x"#,
            &Delimiters::default(),
            MissingKeyPolicy::Default,
        )
        .unwrap();
        assert_eq!(tmpl.defined_templates(), vec!["a", "b", "main"]);
    }

    #[test]
    fn test_execute_writes_nothing_on_failure() {
        let tmpl = Template::parse("t", "partial {{ .x.y }}", &Delimiters::default(), MissingKeyPolicy::Error)
            .unwrap();
        let mut out = Vec::new();
        assert!(tmpl.execute(&Value::Null, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_line_and_column() {
        assert_eq!(line_and_column("abc", 2), (1, 2));
        assert_eq!(line_and_column("ab\ncd", 4), (2, 1));
    }
}
