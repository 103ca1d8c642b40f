//! HTTP worker adapter.
//!
//! Speaks a small JSON protocol to a remote code-generation service:
//!
//! - `POST {base}/sessions` with the ticket and rendered context → `{ "session_id" }`
//! - `GET {base}/sessions/{id}` → `{ status, snapshot?, patch?, message? }`
//! - `POST {base}/sessions/{id}/cancel`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{ContextSlice, PollReport, SessionId, Ticket, WorkerConfig};
use crate::domain::ports::Worker;

const SERVICE: &str = "worker";

#[derive(Debug, Serialize)]
struct OpenSessionRequest<'a> {
    ticket: &'a Ticket,
    context: &'a ContextSlice,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OpenSessionResponse {
    session_id: SessionId,
}

/// Remote worker reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpWorker {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWorker {
    pub fn new(config: &WorkerConfig) -> PortResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PortError::unreachable(SERVICE, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> PortResult<reqwest::Response> {
        let response = self.dispatch(request).await?;
        Self::check(response).await
    }

    async fn dispatch(&self, request: RequestBuilder) -> PortResult<reqwest::Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| PortError::unreachable(SERVICE, e))
    }

    async fn check(response: reqwest::Response) -> PortResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        if status.is_server_error() {
            Err(PortError::unreachable(SERVICE, format!("{status}: {body}")))
        } else {
            Err(PortError::invalid_response(SERVICE, format!("{status}: {body}")))
        }
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open_session(&self, ticket: &Ticket, context: &ContextSlice) -> PortResult<SessionId> {
        let body = OpenSessionRequest {
            ticket,
            context,
            prompt: context.render(),
        };
        let response = self
            .send(self.http.post(format!("{}/sessions", self.base_url)).json(&body))
            .await?;
        let opened: OpenSessionResponse = response
            .json()
            .await
            .map_err(|e| PortError::invalid_response(SERVICE, e))?;
        debug!(session_id = %opened.session_id, "worker session opened");
        Ok(opened.session_id)
    }

    async fn poll_status(&self, session_id: &SessionId) -> PortResult<PollReport> {
        let request = self
            .http
            .get(format!("{}/sessions/{}", self.base_url, session_id));
        let response = self.dispatch(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PortError::UnknownSession(session_id.to_string()));
        }
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::invalid_response(SERVICE, e))
    }

    async fn cancel_session(&self, session_id: &SessionId) -> PortResult<()> {
        self.send(
            self.http
                .post(format!("{}/sessions/{}/cancel", self.base_url, session_id)),
        )
        .await?;
        Ok(())
    }
}
