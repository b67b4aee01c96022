use futures_util::StreamExt;
use indicatif::ProgressBar;
use serde::Deserialize;

use crate::error::{ApiError, decode_stream_error};
use crate::transport::{LineStream, TransportError};

/// How a streamed response ended.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// End of stream reached; carries the last non-empty line, if any.
    Completed(Option<String>),
    /// The server reported an error; reading stopped at that line.
    Failed { error: ApiError, line: String },
}

#[derive(Deserialize)]
struct Progress {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Read `lines` until the server reports an error or the stream ends, showing progress as it
/// arrives. The caller still owns the stream and drops it on return.
pub async fn display_stream(
    lines: &mut LineStream,
    progress: Option<&ProgressBar>,
) -> Result<StreamEnd, TransportError> {
    let mut last = None;
    while let Some(line) = lines.next().await {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(error) = decode_stream_error(trimmed) {
            log::debug!("Stream reported error: {trimmed}");
            return Ok(StreamEnd::Failed {
                error,
                line: trimmed.to_string(),
            });
        }
        show_progress(trimmed, progress);
        last = Some(trimmed.to_string());
    }
    Ok(StreamEnd::Completed(last))
}

/// Text worth showing for a progress line. JSON lines without `status` or `message` are silent.
fn progress_text(line: &str) -> Option<String> {
    match serde_json::from_str::<Progress>(line) {
        Ok(p) => p.status.or(p.message),
        Err(_) => Some(line.to_string()),
    }
}

/// Every progress line stays in the output; the spinner only tracks the latest one.
fn show_progress(line: &str, progress: Option<&ProgressBar>) {
    let Some(text) = progress_text(line) else {
        return;
    };
    match progress {
        Some(pb) => {
            pb.suspend(|| eprintln!("{text}"));
            pb.set_message(text);
        }
        None => eprintln!("{text}"),
    }
}

/// Hostname assigned by the server, when the payload carries one.
pub fn extract_hostname(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    match value.get("hostname")? {
        serde_json::Value::String(h) if !h.is_empty() => Some(h.clone()),
        _ => None,
    }
}
