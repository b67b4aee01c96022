use anyhow::anyhow;
use console::{Emoji, style};
use serde::Deserialize;
use thiserror::Error;

static WARNING: Emoji = Emoji("⚠️  ", "");
static ERROR: Emoji = Emoji("❌ ", "");
static NO_ENTRY: Emoji = Emoji("⛔ ", "");

/// Structured failure reported by the server inside a streamed response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ApiError {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        self.code == 409
    }
}

/// Decode a stream line as a server error. Lines carrying a `code` below 400 are progress.
pub fn decode_stream_error(line: &str) -> Option<ApiError> {
    serde_json::from_str::<ApiError>(line)
        .ok()
        .filter(|e| e.code >= 400)
}

/// Operator-facing text for a failed response or a stream error line. The body is kept verbatim.
pub fn format_server_error(status: u16, body: &str, operation: &str) -> String {
    let body = body.trim();
    match status {
        400..=499 => format!("{}{}", NO_ENTRY, style(body).red()),
        503 => format!(
            "{}{}",
            WARNING,
            style(format!("Service temporarily unavailable: {body}")).yellow()
        ),
        _ => format!("{}Failed to {} ({}): {}", ERROR, operation, status, body),
    }
}

pub fn server_error(status: u16, body: &str, operation: &str) -> anyhow::Error {
    anyhow!(format_server_error(status, body, operation))
}
