//! Core library for datasubst.
//!
//! Renders Go `text/template` templates against structured data taken from a
//! JSON document, a YAML document, or the process environment. The stages are
//! exposed individually and chained by [`pipeline::render`]:
//!
//! - [`loader`]: decode a data source into a [`value::Value`] tree
//! - [`subtree`]: optionally narrow the tree to a nested mapping
//! - [`template`]: parse the template text and render it against the data
//!
//! ```
//! use datasubst_core::pipeline::{render, DataSource, RenderConfig, RenderRequest};
//!
//! let output = render(&RenderRequest {
//!     template: b"Hello, {{ .name }}!",
//!     source: DataSource::Json(br#"{"name": "World"}"#.to_vec()),
//!     config: RenderConfig::default(),
//! })
//! .unwrap();
//! assert_eq!(output, b"Hello, World!");
//! ```

pub mod error;
pub mod loader;
pub mod pipeline;
pub mod subtree;
pub mod template;
pub mod value;

pub use error::{DatasubstError, ErrorKind, Result};
