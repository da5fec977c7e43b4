//! Terminal output formatting for the datasubst CLI.
//!
//! Everything here goes to stderr; stdout carries only rendered templates.

use console::style;

/// Print an error and its causes as one line, prefixed with a red `error:`.
///
/// Causes whose text already appears in an outer message are skipped.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", style("error:").red().bold(), error_chain(err));
}

fn error_chain(err: &anyhow::Error) -> String {
    let mut message = String::new();
    for cause in err.chain() {
        let text = cause.to_string();
        if message.contains(&text) {
            continue;
        }
        if !message.is_empty() {
            message.push_str(": ");
        }
        message.push_str(&text);
    }
    message
}
