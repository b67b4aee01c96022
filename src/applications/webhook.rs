use anyhow::Result;
use console::Emoji;
use reqwest::Method;
use serde::Serialize;

use crate::error::server_error;
use crate::transport::Transport;

static HOOK: Emoji = Emoji("🪝 ", "");

#[derive(Debug, Serialize)]
struct Webhook<'a> {
    url: &'a str,
}

fn hook_path(application: &str) -> String {
    format!("/applications/{application}/hook")
}

fn delete_path(application: &str, url: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", url)
        .finish();
    format!("{}?{}", hook_path(application), query)
}

/// Pretty-prints a JSON body, falling back to the raw text.
fn render(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

async fn call(
    transport: &dyn Transport,
    method: Method,
    path: &str,
    body: Option<Vec<u8>>,
    operation: &str,
) -> Result<String> {
    let response = transport.execute(method, path, body).await?;
    let status = response.status;
    let success = response.is_success();
    let text = response.text().await?;
    if !success {
        return Err(server_error(status, &text, operation));
    }
    Ok(text)
}

pub async fn list(transport: &dyn Transport, application: &str) -> Result<()> {
    let body = call(
        transport,
        Method::GET,
        &hook_path(application),
        None,
        "list webhooks",
    )
    .await?;
    println!("{}", render(&body));
    Ok(())
}

pub async fn add(transport: &dyn Transport, application: &str, url: &str) -> Result<()> {
    let payload = serde_json::to_vec_pretty(&Webhook { url })?;
    let body = call(
        transport,
        Method::POST,
        &hook_path(application),
        Some(payload),
        "add webhook",
    )
    .await?;
    eprintln!("{HOOK}Webhook {url} added to {application}");
    if !body.trim().is_empty() {
        println!("{}", render(&body));
    }
    Ok(())
}

pub async fn delete(transport: &dyn Transport, application: &str, url: &str) -> Result<()> {
    let body = call(
        transport,
        Method::DELETE,
        &delete_path(application, url),
        None,
        "delete webhook",
    )
    .await?;
    eprintln!("{HOOK}Webhook {url} deleted from {application}");
    if !body.trim().is_empty() {
        println!("{}", render(&body));
    }
    Ok(())
}
