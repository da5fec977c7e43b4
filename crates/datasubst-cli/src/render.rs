use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

use datasubst_core::pipeline::{self, DataSource, RenderConfig, RenderRequest};

use crate::Cli;

/// `-` stands for standard input or output.
const STDIO: &str = "-";

/// The named file, or `None` for standard input/output.
fn named_file(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| p.as_os_str() != STDIO)
}

fn read_template(input: Option<&Path>) -> Result<Vec<u8>> {
    match named_file(input) {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read template file {}", path.display()))
        }
        None => {
            let mut bytes = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut bytes)
                .context("failed to read template from standard input")?;
            Ok(bytes)
        }
    }
}

fn read_data(path: &Path, format: &str) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {format} data file {}", path.display()))
}

/// Resolve the data source flags; clap guarantees exactly one is set.
fn data_source(cli: &Cli) -> Result<(DataSource, String)> {
    let source = &cli.source;
    if let Some(path) = &source.json_data {
        return Ok((DataSource::Json(read_data(path, "JSON")?), path.display().to_string()));
    }
    if let Some(path) = &source.yaml_data {
        return Ok((DataSource::Yaml(read_data(path, "YAML")?), path.display().to_string()));
    }
    Ok((DataSource::from_process_env(), "the environment".to_string()))
}

fn write_output(output: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match named_file(output) {
        Some(path) => fs::write(path, bytes)
            .with_context(|| format!("failed to write output file {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(bytes)
                .and_then(|()| stdout.flush())
                .context("failed to write to standard output")
        }
    }
}

/// Read, render, write. The output destination is not touched unless rendering succeeded.
pub fn run(cli: &Cli) -> Result<()> {
    let config = RenderConfig::from_options(cli.subtree.as_deref(), cli.delims.as_deref(), cli.strict)?;

    let input = cli.input.as_deref();
    let template = read_template(input)?;
    let (source, source_label) = data_source(cli)?;
    let template_label = match named_file(input) {
        Some(path) => path.display().to_string(),
        None => "standard input".to_string(),
    };
    tracing::info!(template = %template_label, data = %source_label, "rendering");

    let rendered = pipeline::render(&RenderRequest {
        template: &template,
        source,
        config,
    })
    .with_context(|| format!("cannot render {template_label} with data from {source_label}"))?;

    write_output(cli.output.as_deref(), &rendered)?;
    tracing::info!(bytes = rendered.len(), "done");
    Ok(())
}
