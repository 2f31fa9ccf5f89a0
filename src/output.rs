use crate::cli::OutputFormat;
use forge::{ForgeError, ERROR_CODES};
use serde_json::json;

pub fn emit_output(output: &OutputFormat, command: &str, payload: serde_json::Value) {
    match output {
        OutputFormat::Text => payload
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| println!("{}", payload), |msg| println!("{}", msg)),
        OutputFormat::Json => println!(
            "{}",
            json!({
                "command": command,
                "status": "ok",
                "payload": payload,
            })
        ),
    }
}

pub fn emit_error(output: &OutputFormat, error: &ForgeError) {
    let kind = error.code();
    let hint = hint_for(kind);

    match output {
        OutputFormat::Text => {
            eprintln!("error [{}]: {}", kind, error);
            eprintln!("hint: {}", hint);
        }
        OutputFormat::Json => {
            eprintln!(
                "{}",
                json!({
                    "status": "error",
                    "error": {
                        "kind": kind,
                        "message": error.to_string(),
                        "hint": hint,
                        "exit_code": error.exit_code(),
                    }
                })
            );
        }
    }
}

fn hint_for(kind: &str) -> &'static str {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == kind)
        .map_or("Inspect logs and retry command", |(_, _, hint)| hint)
}
