use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::{Client, Method, header::CONTENT_TYPE};
use thiserror::Error;

use crate::config::CliConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lazily read response body, one line per item. Dropping it releases the connection.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

pub struct ApiResponse {
    pub status: u16,
    pub lines: LineStream,
}

impl ApiResponse {
    pub fn new(status: u16, lines: LineStream) -> Self {
        ApiResponse { status, lines }
    }

    #[cfg(test)]
    pub fn from_lines(status: u16, lines: &[&str]) -> Self {
        let owned: Vec<Result<String, TransportError>> =
            lines.iter().map(|l| Ok(l.to_string())).collect();
        ApiResponse::new(status, Box::pin(futures_util::stream::iter(owned)))
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Drain the remaining body into a single string.
    pub async fn text(self) -> Result<String, TransportError> {
        let lines: Vec<String> = self.lines.try_collect().await?;
        Ok(lines.join("\n"))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the response for any status code; only a failure to get a response is an error.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ApiResponse, TransportError>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(client: Client, config: &mut CliConfig) -> anyhow::Result<Self> {
        let (username, password) = config.credentials()?;
        Ok(HttpTransport {
            client,
            base_url: config.url(""),
            username,
            password,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ApiResponse, TransportError> {
        log::debug!("{} {}{}", method, self.base_url, path);
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        log::debug!("Response status: {status}");
        Ok(ApiResponse::new(status, lines(response.bytes_stream())))
    }
}

/// Split a chunked byte stream on `\n`. A trailing `\r` is stripped and a final
/// unterminated line is still yielded.
pub fn lines<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let state = (Box::pin(chunks), Vec::<u8>::new(), false);
    Box::pin(futures_util::stream::unfold(
        state,
        |(mut chunks, mut buf, mut done)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let rest = buf.split_off(pos + 1);
                    let line = std::mem::replace(&mut buf, rest);
                    return Some((Ok(decode_line(line)), (chunks, buf, done)));
                }
                if done {
                    if buf.is_empty() {
                        return None;
                    }
                    let line = std::mem::take(&mut buf);
                    return Some((Ok(decode_line(line)), (chunks, buf, done)));
                }
                match chunks.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        // A broken body ends the stream after the error.
                        buf.clear();
                        done = true;
                        return Some((Err(e.into()), (chunks, buf, done)));
                    }
                    None => done = true,
                }
            }
        },
    ))
}

fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8_lossy(&line).into_owned()
}
