mod styling;

use serde_json::Value;

use crate::outcome::ToolResult;

use styling::{bright_green, bright_red, dim, magenta_bold};

/// Prints the `ci-triage` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🩺 ci-triage"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab pipeline failure triage")
    );
}

/// Prints a one-line summary of a tool result to stderr, leaving stdout to
/// the JSON document.
pub fn print_result<T>(result: &ToolResult<T>) {
    eprintln!(
        "{}",
        status_line(result.is_success(), result.error_message())
    );
}

/// [`print_result`] for results that were already turned into JSON.
///
/// Values without a `status` field (tool listings, inspection reports) are
/// summarized per entry.
pub fn print_status(value: &Value) {
    match value {
        Value::Object(fields) if fields.contains_key("status") => {
            eprintln!("{}", json_status_line(value));
        }
        Value::Object(fields) => {
            for (step, result) in fields {
                eprintln!("{} {}", dim(format!("{step}:")), json_status_line(result));
            }
        }
        Value::Array(items) => {
            eprintln!("{}", dim(format!("{} tools available", items.len())));
        }
        _ => {}
    }
}

fn json_status_line(result: &Value) -> String {
    status_line(
        result["status"] == "success",
        result["error_message"].as_str(),
    )
}

fn status_line(success: bool, error_message: Option<&str>) -> String {
    if success {
        format!("{} {}", bright_green("✔"), bright_green("success"))
    } else {
        let message = error_message.unwrap_or("unknown error");
        format!("{} {}", bright_red("✘"), bright_red(message))
    }
}
