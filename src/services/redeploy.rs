use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use console::Emoji;
use reqwest::Method;

use crate::error::server_error;
use crate::services::add::{RedeploySequence, StartSequence};
use crate::services::spec::{RedeploySpec, service_path};
use crate::stream::{StreamEnd, display_stream};
use crate::transport::Transport;

static CHECK: Emoji = Emoji("✅ ", "");

/// `POST .../redeploy` with the reduced spec, then hands the service to the start sequence.
pub struct HttpRedeploySequence {
    transport: Arc<dyn Transport>,
    start: Arc<dyn StartSequence>,
    batch: bool,
}

impl HttpRedeploySequence {
    pub fn new(transport: Arc<dyn Transport>, start: Arc<dyn StartSequence>, batch: bool) -> Self {
        HttpRedeploySequence {
            transport,
            start,
            batch,
        }
    }
}

#[async_trait]
impl RedeploySequence for HttpRedeploySequence {
    async fn redeploy(&self, spec: RedeploySpec, application: &str, service: &str) -> Result<()> {
        let body = serde_json::to_vec_pretty(&spec)?;
        let path = format!("{}/redeploy", service_path(application, service));
        let response = self
            .transport
            .execute(Method::POST, &path, Some(body))
            .await?;
        if !response.is_success() {
            let status = response.status;
            return Err(server_error(status, &response.text().await?, "redeploy service"));
        }

        let mut lines = response.lines;
        if let StreamEnd::Failed { error, line } = display_stream(&mut lines, None).await? {
            return Err(server_error(error.code, &line, "redeploy service"));
        }
        drop(lines);

        eprintln!("{CHECK}Service {application}/{service} redeployed");
        self.start.start(application, service, self.batch).await
    }
}
