/// Classify a failure message into a normalized diagnostics category.
#[must_use]
pub fn classify_failure_category(message: &str) -> &'static str {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("timeout") || lowered.contains("timed out") {
        "timeout"
    } else if lowered.contains("cancel") {
        "cancelled"
    } else if lowered.contains("compile") || lowered.contains("syntax") {
        "compile_error"
    } else if lowered.contains("test") || lowered.contains("assert") {
        "test_failure"
    } else if lowered.contains("unavailable") || lowered.contains("unreachable") {
        "transport_failure"
    } else {
        "generation_failure"
    }
}

/// Redact sensitive tokens (API keys, passwords, etc.) from a message before
/// it reaches the job log stream.
#[must_use]
pub fn redact_sensitive(message: &str) -> String {
    message
        .split_whitespace()
        .map(redact_token)
        .collect::<Vec<_>>()
        .join(" ")
}

#[must_use]
fn redact_token(token: &str) -> String {
    token.split_once('=').map_or_else(
        || token.to_string(),
        |(key, _)| {
            let normalized = key.to_ascii_lowercase();
            if ["token", "password", "secret", "api_key", "database_url", "credential"]
                .iter()
                .any(|sensitive| normalized.contains(sensitive))
            {
                format!("{key}=<redacted>")
            } else {
                token.to_string()
            }
        },
    )
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn categories_cover_the_failure_taxonomy() {
        assert_eq!(classify_failure_category("validate call timed out"), "timeout");
        assert_eq!(classify_failure_category("job cancelled"), "cancelled");
        assert_eq!(classify_failure_category("compile failed"), "compile_error");
        assert_eq!(classify_failure_category("unit test assert broke"), "test_failure");
        assert_eq!(classify_failure_category("executor unavailable"), "transport_failure");
        assert_eq!(classify_failure_category("who knows"), "generation_failure");
    }

    #[test]
    fn secrets_are_masked() {
        let redacted = redact_sensitive("deploy with api_key=sk-123 retries=3");
        assert!(redacted.contains("api_key=<redacted>"));
        assert!(redacted.contains("retries=3"));
    }
}
