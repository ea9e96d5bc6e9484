use thiserror::Error;

/// Upper bound on how much of a response body is carried in errors and emails.
pub const MAX_BODY_CHARS: usize = 2048;

/// Common error types used across the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Login response did not contain an access token")]
    MissingToken,

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl WatchError {
    /// Build a `Status` error, truncating the body.
    pub fn status(status: u16, body: &str) -> Self {
        WatchError::Status {
            status,
            body: truncate_body(body),
        }
    }
}

/// Cut a response body down to `MAX_BODY_CHARS` characters.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => format!("{}... [truncated]", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");

        let long = "é".repeat(MAX_BODY_CHARS + 10);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("... [truncated]"));
        assert_eq!(cut.chars().filter(|c| *c == 'é').count(), MAX_BODY_CHARS);
    }

    #[test]
    fn test_status_error_display() {
        let err = WatchError::status(401, "{\"message\":\"Unauthenticated.\"}");
        assert_eq!(err.to_string(), "HTTP 401: {\"message\":\"Unauthenticated.\"}");
    }
}
