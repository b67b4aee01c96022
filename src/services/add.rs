use async_trait::async_trait;
use indicatif::ProgressBar;
use reqwest::Method;
use thiserror::Error;

use crate::error::{ApiError, format_server_error};
use crate::services::spec::{RedeploySpec, ServiceSpec};
use crate::stream::{StreamEnd, display_stream, extract_hostname};
use crate::transport::{LineStream, Transport, TransportError};

/// Brings a freshly created service up; see `start::HttpStartSequence`.
#[async_trait]
pub trait StartSequence: Send + Sync {
    async fn start(&self, application: &str, service: &str, batch: bool) -> anyhow::Result<()>;
}

/// Updates an existing service in place; see `redeploy::HttpRedeploySequence`.
#[async_trait]
pub trait RedeploySequence: Send + Sync {
    async fn redeploy(
        &self,
        spec: RedeploySpec,
        application: &str,
        service: &str,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Failed to encode service specification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{}", format_server_error(*.status, .body, "create service"))]
    Server { status: u16, body: String },

    /// Error line reported inside the create stream. `line` is the raw server text.
    #[error("{}", format_server_error(.error.code, .line, "create service"))]
    Stream { error: ApiError, line: String },

    #[error("Redeploy of {application}/{service} failed: {reason}")]
    Redeploy {
        application: String,
        service: String,
        reason: anyhow::Error,
    },

    #[error("Start of {application}/{service} failed: {reason}")]
    Start {
        application: String,
        service: String,
        reason: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Switch to the redeploy path when the service already exists.
    pub redeploy: bool,
    /// Do not attach the console when starting.
    pub batch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Started { hostname: Option<String> },
    Redeployed,
}

enum State {
    Compiled,
    Streaming(LineStream),
    Conflict { status: u16, body: String },
    Redeploying,
    Started { hostname: Option<String> },
}

/// Runs the create-or-redeploy protocol for one compiled [`ServiceSpec`].
pub struct Deployer<'a> {
    transport: &'a dyn Transport,
    start: &'a dyn StartSequence,
    redeploy: &'a dyn RedeploySequence,
    progress: Option<ProgressBar>,
}

impl<'a> Deployer<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        start: &'a dyn StartSequence,
        redeploy: &'a dyn RedeploySequence,
    ) -> Self {
        Deployer {
            transport,
            start,
            redeploy,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn deploy(
        &self,
        spec: &ServiceSpec,
        options: DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let result = self.run(spec, options).await;
        self.clear_progress();
        result
    }

    async fn run(
        &self,
        spec: &ServiceSpec,
        options: DeployOptions,
    ) -> Result<DeployOutcome, DeployError> {
        let (application, service) = (spec.application.as_str(), spec.service.as_str());
        let mut state = State::Compiled;
        loop {
            state = match state {
                State::Compiled => {
                    let body = serde_json::to_vec_pretty(spec)?;
                    if let Some(pb) = &self.progress {
                        pb.set_message(format!("Creating service {application}/{service}..."));
                    }
                    let response = self
                        .transport
                        .execute(Method::POST, &spec.path(), Some(body))
                        .await?;
                    let status = response.status;
                    match status {
                        409 => State::Conflict {
                            status: 409,
                            body: response.text().await?,
                        },
                        400.. => {
                            return Err(DeployError::Server {
                                status,
                                body: response.text().await?,
                            });
                        }
                        _ => State::Streaming(response.lines),
                    }
                }
                State::Streaming(mut lines) => {
                    let end = display_stream(&mut lines, self.progress.as_ref()).await?;
                    drop(lines);
                    match end {
                        StreamEnd::Failed { error, line } if error.is_conflict() => {
                            State::Conflict {
                                status: error.code,
                                body: line,
                            }
                        }
                        StreamEnd::Failed { error, line } => {
                            return Err(DeployError::Stream { error, line });
                        }
                        StreamEnd::Completed(last) => State::Started {
                            hostname: last.as_deref().and_then(extract_hostname),
                        },
                    }
                }
                State::Conflict { status, body } => {
                    if !options.redeploy {
                        return Err(DeployError::Server { status, body });
                    }
                    log::debug!("{application}/{service} already exists, redeploying");
                    State::Redeploying
                }
                State::Redeploying => {
                    self.clear_progress();
                    eprintln!("Service {application}/{service} already exists, redeploying...");
                    self.redeploy
                        .redeploy(RedeploySpec::from(spec), application, service)
                        .await
                        .map_err(|reason| DeployError::Redeploy {
                            application: application.to_string(),
                            service: service.to_string(),
                            reason,
                        })?;
                    return Ok(DeployOutcome::Redeployed);
                }
                State::Started { hostname } => {
                    self.clear_progress();
                    if let Some(hostname) = &hostname {
                        println!("Hostname: {hostname}");
                    }
                    eprintln!("Starting service {application}/{service}...");
                    self.start
                        .start(application, service, options.batch)
                        .await
                        .map_err(|reason| DeployError::Start {
                            application: application.to_string(),
                            service: service.to_string(),
                            reason,
                        })?;
                    return Ok(DeployOutcome::Started { hostname });
                }
            };
        }
    }

    fn clear_progress(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
    }
}
