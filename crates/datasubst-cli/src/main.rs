//! datasubst CLI: render a Go text/template against JSON, YAML or environment data.
//!
//! Reads the template from a file or standard input, loads the data source,
//! optionally narrows it to a subtree, and writes the rendered text to a file
//! or standard output. Output is written only when rendering succeeds.

mod output;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser};
use datasubst_core::{DatasubstError, ErrorKind};

#[derive(Parser)]
#[command(
    name = "datasubst",
    about = "Substitute JSON, YAML or environment data into a Go text/template",
    version
)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Template file to read (default: standard input; `-` also means standard input)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// File to write the result to (default: standard output; `-` also means standard output)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Fail on keys missing from the data instead of rendering them empty
    #[arg(short, long)]
    strict: bool,

    /// Render against the subtree at this dotted path, e.g. `.key2.first` (JSON/YAML only)
    #[arg(short = 'p', long, value_name = "PATH")]
    subtree: Option<String>,

    /// Action delimiters as LEFT:RIGHT, e.g. `((:))`
    #[arg(short, long, value_name = "LEFT:RIGHT", env = "DATASUBST_DELIMS")]
    delims: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Exactly one data source is required.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Read data from a JSON file
    #[arg(short, long, value_name = "FILE")]
    json_data: Option<PathBuf>,

    /// Read data from a YAML file
    #[arg(short, long, value_name = "FILE")]
    yaml_data: Option<PathBuf>,

    /// Use the process environment as data
    #[arg(short, long)]
    env_data: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match render::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&err);
            ExitCode::from(exit_status(&err))
        }
    }
}

/// 2 for usage errors, 1 for everything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    let usage = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<DatasubstError>())
        .any(|cause| cause.kind() == ErrorKind::Usage);
    if usage {
        2
    } else {
        1
    }
}
