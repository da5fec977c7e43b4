//! The end-to-end render pipeline: Load → Navigate → Parse → Render.

use crate::error::{DatasubstError, Result};
use crate::loader::{self, DataFormat};
use crate::subtree::{self, SubtreePath};
use crate::template::{Delimiters, MissingKeyPolicy, Template};
use crate::value::Value;

/// Name the template is parsed under; it appears in parse and render errors.
pub const TEMPLATE_NAME: &str = "template";

/// Where the template data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Json(Vec<u8>),
    Yaml(Vec<u8>),
    /// A snapshot of environment variables, as `(name, value)` pairs.
    Environment(Vec<(String, String)>),
}

impl DataSource {
    /// Snapshot the current process environment.
    pub fn from_process_env() -> Self {
        DataSource::Environment(loader::process_env_pairs())
    }

    fn describe(&self) -> &'static str {
        match self {
            DataSource::Json(_) => "json",
            DataSource::Yaml(_) => "yaml",
            DataSource::Environment(_) => "environment",
        }
    }
}

/// Everything that tunes a render besides the template and the data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderConfig {
    pub delimiters: Delimiters,
    pub missing_key: MissingKeyPolicy,
    pub subtree: Option<SubtreePath>,
}

impl RenderConfig {
    /// Build a config from raw caller options, validating each one.
    pub fn from_options(subtree: Option<&str>, delims: Option<&str>, strict: bool) -> Result<Self> {
        let delimiters = match delims {
            Some(spec) => Delimiters::parse_spec(spec)?,
            None => Delimiters::default(),
        };
        let subtree = subtree.map(SubtreePath::parse).transpose()?;
        let missing_key = if strict {
            MissingKeyPolicy::Error
        } else {
            MissingKeyPolicy::Default
        };
        Ok(Self {
            delimiters,
            missing_key,
            subtree,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// Template text; must be UTF-8.
    pub template: &'a [u8],
    pub source: DataSource,
    pub config: RenderConfig,
}

/// Load the data, narrow it to the configured subtree, then parse and render the template.
///
/// Either the whole output is returned or an error; there is no partial output.
pub fn render(request: &RenderRequest<'_>) -> Result<Vec<u8>> {
    let config = &request.config;
    tracing::debug!(
        source = request.source.describe(),
        template_bytes = request.template.len(),
        strict = config.missing_key == MissingKeyPolicy::Error,
        "starting render"
    );

    if config.subtree.is_some() && matches!(request.source, DataSource::Environment(_)) {
        return Err(DatasubstError::Usage(
            "a subtree path cannot be used with environment data".into(),
        ));
    }

    let data = load(&request.source)?;
    let scoped = match &config.subtree {
        Some(path) => subtree::navigate(&data, path)?,
        None => &data,
    };

    let template = Template::parse_bytes(
        TEMPLATE_NAME,
        request.template,
        &config.delimiters,
        config.missing_key,
    )?;
    let rendered = template.render(scoped)?;
    Ok(rendered.into_bytes())
}

fn load(source: &DataSource) -> Result<Value> {
    match source {
        DataSource::Json(bytes) => loader::load_bytes(DataFormat::Json, bytes),
        DataSource::Yaml(bytes) => loader::load_bytes(DataFormat::Yaml, bytes),
        DataSource::Environment(pairs) => Ok(loader::load_env_pairs(pairs.iter().cloned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn request(template: &str, source: DataSource, config: RenderConfig) -> Result<String> {
        let bytes = render(&RenderRequest {
            template: template.as_bytes(),
            source,
            config,
        })?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_from_options_defaults() {
        let config = RenderConfig::from_options(None, None, false).unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_from_options_all_set() {
        let config = RenderConfig::from_options(Some(".a.b"), Some("((:))"), true).unwrap();
        assert_eq!(config.missing_key, MissingKeyPolicy::Error);
        assert_eq!(config.delimiters.left(), "((");
        assert_eq!(config.subtree.unwrap().segments(), ["a", "b"]);
    }

    #[test]
    fn test_from_options_rejects_bad_values() {
        let err = RenderConfig::from_options(None, Some("(("), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let err = RenderConfig::from_options(Some(""), None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_subtree_with_environment_is_usage_error() {
        let config = RenderConfig::from_options(Some(".a"), None, false).unwrap();
        let err = request(
            "{{ .x }}",
            DataSource::Environment(vec![("a".into(), "1".into())]),
            config,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_decode_error_stops_before_parse() {
        // The template is also broken; the decode error wins because loading comes first.
        let err = request(
            "{{ .x ",
            DataSource::Json(b"{not json".to_vec()),
            RenderConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_error_uses_template_name() {
        let err = request("{{ end }}", DataSource::Json(b"{}".to_vec()), RenderConfig::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "template: template:1: unexpected {{end}}");
    }
}
