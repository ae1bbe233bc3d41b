//! Remote oracle client
//!
//! Talks to the reasoning service over HTTP: submit an invocation, then
//! poll its status at a fixed interval until it reaches a terminal state.
//! The poll loop has no engine-level deadline; the call blocks for as
//! long as the remote side keeps the invocation in flight.

use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::PhalanxError;
use crate::knowledge::Uploader;
use crate::oracle::{Oracle, OracleRequest, OracleResponse, OracleStatus};
use crate::protocol::{ActionKind, ConversationId, OracleAction, RemoteFileId};

/// HTTP client for the reasoning service.
pub struct RemoteOracle {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, Serialize)]
struct InvocationBody {
    worker_name: String,
    instructions: String,
    input: String,
    allowed_actions: Vec<ActionKind>,
    context_files: Vec<RemoteFileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct InvocationState {
    invocation_id: String,
    status: RemoteStatus,
    conversation: Uuid,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    actions: Vec<OracleAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RemoteStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl RemoteStatus {
    fn is_terminal(self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }
}

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
    file_name: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UploadReceipt {
    file_id: String,
}

impl RemoteOracle {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn submit(&self, request: &OracleRequest) -> Result<InvocationState, PhalanxError> {
        let body = InvocationBody {
            worker_name: request.worker_name.clone(),
            instructions: request.instructions.clone(),
            input: request.prompt.clone(),
            allowed_actions: request.allowed_actions.clone(),
            context_files: request.context_files.clone(),
            conversation: request.conversation.map(|c| c.0),
        };

        let response = self
            .request(self.http.post(format!("{}/invocations", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))
    }

    async fn poll(&self, invocation_id: &str) -> Result<InvocationState, PhalanxError> {
        let response = self
            .request(self.http.get(format!(
                "{}/invocations/{}",
                self.base_url, invocation_id
            )))
            .send()
            .await
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))
    }
}

#[async_trait]
impl Oracle for RemoteOracle {
    async fn invoke(&self, request: OracleRequest) -> Result<OracleResponse, PhalanxError> {
        let mut state = self.submit(&request).await?;

        while !state.status.is_terminal() {
            debug!(invocation = %state.invocation_id, status = ?state.status, "Polling invocation");
            tokio::time::sleep(self.poll_interval).await;
            state = self.poll(&state.invocation_id).await?;
        }

        let status = match state.status {
            RemoteStatus::Completed => OracleStatus::Completed,
            _ => OracleStatus::Failed,
        };

        Ok(OracleResponse {
            status,
            text: state.text,
            actions: state.actions,
            conversation: ConversationId(state.conversation),
        })
    }
}

#[async_trait]
impl Uploader for RemoteOracle {
    async fn upload(&self, path: &Path) -> Result<RemoteFileId, PhalanxError> {
        let content = tokio::fs::read_to_string(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let response = self
            .request(self.http.post(format!("{}/files", self.base_url)))
            .json(&UploadBody {
                file_name: &file_name,
                content,
            })
            .send()
            .await
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?;

        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| PhalanxError::OracleUnavailable(e.to_string()))?;

        Ok(RemoteFileId(receipt.file_id))
    }
}
