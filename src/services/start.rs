use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use console::{Emoji, style};
use futures_util::StreamExt;
use reqwest::Method;
use serde::Deserialize;

use crate::error::server_error;
use crate::services::add::StartSequence;
use crate::services::spec::service_path;
use crate::stream::{StreamEnd, display_stream, extract_hostname};
use crate::transport::Transport;

static ROCKET: Emoji = Emoji("🚀 ", "");

/// One line of `GET .../events`.
#[derive(Debug, Deserialize)]
struct ServiceEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    prev_state: Option<String>,
    #[serde(default)]
    event: Option<String>,
}

impl ServiceEvent {
    fn datetime(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp?;
        DateTime::from_timestamp(ts.trunc() as i64, (ts.fract() * 1e9) as u32)
    }

    fn describe(&self) -> Option<String> {
        let state = self.state.as_deref()?;
        let container = self
            .id
            .as_deref()
            .map(|id| id.get(0..8).unwrap_or(id))
            .unwrap_or("service");
        let at = self
            .datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let transition = match self.prev_state.as_deref() {
            Some(prev) => format!("{prev} -> {state}"),
            None => state.to_string(),
        };
        Some(format!(
            "[{}] {} {} {}",
            at,
            style(container).yellow(),
            self.event.as_deref().unwrap_or("state"),
            transition
        ))
    }
}

/// Attaches to the service console (unless batch), follows its events and starts it.
pub struct HttpStartSequence {
    transport: Arc<dyn Transport>,
}

impl HttpStartSequence {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        HttpStartSequence { transport }
    }
}

#[async_trait]
impl StartSequence for HttpStartSequence {
    async fn start(&self, application: &str, service: &str, batch: bool) -> Result<()> {
        let base = service_path(application, service);

        let attach = (!batch).then(|| {
            tokio::spawn(attach_console(
                self.transport.clone(),
                format!("{base}/attach"),
            ))
        });
        let events = tokio::spawn(follow_events(self.transport.clone(), format!("{base}/events")));

        let result = start_service(self.transport.as_ref(), &base).await;
        if result.is_err() {
            if let Some(attach) = &attach {
                attach.abort();
            }
            events.abort();
            return result;
        }

        if let Some(attach) = attach {
            tokio::select! {
                finished = attach => {
                    if let Err(e) = finished {
                        log::debug!("Console attach task ended: {e}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Detached from {application}/{service}");
                }
            }
        }
        events.abort();
        Ok(())
    }
}

async fn start_service(transport: &dyn Transport, base: &str) -> Result<()> {
    let response = transport
        .execute(Method::POST, &format!("{base}/start"), Some(b"{}".to_vec()))
        .await?;
    if !response.is_success() {
        let status = response.status;
        return Err(server_error(status, &response.text().await?, "start service"));
    }

    let mut lines = response.lines;
    match display_stream(&mut lines, None).await? {
        StreamEnd::Failed { error, line } => {
            Err(server_error(error.code, &line, "start service"))
        }
        StreamEnd::Completed(last) => {
            if let Some(hostname) = last.as_deref().and_then(extract_hostname) {
                println!("{ROCKET}Hostname: {hostname}");
            }
            Ok(())
        }
    }
}

async fn attach_console(transport: Arc<dyn Transport>, path: String) {
    let response = match transport.execute(Method::GET, &path, None).await {
        Ok(r) if r.is_success() => r,
        Ok(r) => {
            log::warn!("Cannot attach console: server returned {}", r.status);
            return;
        }
        Err(e) => {
            log::warn!("Cannot attach console: {e}");
            return;
        }
    };
    let mut lines = response.lines;
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => {
                log::debug!("Console stream closed: {e}");
                break;
            }
        }
    }
}

async fn follow_events(transport: Arc<dyn Transport>, path: String) {
    let response = match transport.execute(Method::GET, &path, None).await {
        Ok(r) if r.is_success() => r,
        Ok(r) => {
            log::debug!("Event stream unavailable: server returned {}", r.status);
            return;
        }
        Err(e) => {
            log::debug!("Event stream unavailable: {e}");
            return;
        }
    };
    let mut lines = response.lines;
    while let Some(Ok(line)) = lines.next().await {
        match serde_json::from_str::<ServiceEvent>(&line) {
            Ok(event) => {
                if let Some(text) = event.describe() {
                    eprintln!("{text}");
                }
            }
            Err(_) => log::debug!("Unrecognized event: {line}"),
        }
    }
}
