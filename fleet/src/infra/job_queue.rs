//! Buildkite agent REST API client.
//!
//! Registration authenticates with the pool's registration token; every other
//! call uses the agent's own access token. Each request logs its timing at
//! debug level.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use fleet_common::{AgentRegistration, BuildInfo, Chunk, Heartbeat, Job, Ping, RegisteredAgent};
use reqwest::{Client, RequestBuilder, header};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ports::JobQueueClient;
use crate::domain::error::QueueError;

/// Per-request timeout; bounds how long an abandoned agent task can linger.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Serialize)]
struct HeartbeatRequest {
    sent_at: String,
}

#[derive(Serialize)]
struct StartRequest<'a> {
    started_at: &'a str,
}

#[derive(Serialize)]
struct FinishRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<&'a str>,
    chunks_failed_count: u32,
}

pub struct HttpJobQueueClient {
    http: Client,
    endpoint: String,
    build: BuildInfo,
}

impl HttpJobQueueClient {
    /// Client for the API rooted at `endpoint`, reporting `build` on register.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, build: BuildInfo, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("agent-fleet/{}", build.version))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            build,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint)
    }

    fn authorized(request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header(header::AUTHORIZATION, format!("Token {token}"))
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response> {
        let started = Instant::now();
        let response = request
            .send()
            .await
            .with_context(|| format!("{operation} request failed"))?;
        let status = response.status();
        tracing::debug!(
            operation,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            "job queue call"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Status {
                operation,
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        self.execute(operation, request)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode {operation} response"))
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[async_trait]
impl JobQueueClient for HttpJobQueueClient {
    async fn register(
        &self,
        name: &str,
        secret: &str,
        tags: &[String],
    ) -> Result<RegisteredAgent> {
        let body = AgentRegistration {
            name: name.to_string(),
            tags: tags.to_vec(),
            version: self.build.version.clone(),
            build: self.build.build.clone(),
            arch: self.build.arch.clone(),
            os: self.build.os.clone(),
        };
        let request = Self::authorized(self.http.post(self.url("register")), secret).json(&body);
        self.execute_json("register", request).await
    }

    async fn beat(&self, token: &str) -> Result<Heartbeat> {
        let body = HeartbeatRequest {
            sent_at: now_rfc3339(),
        };
        let request = Self::authorized(self.http.post(self.url("heartbeat")), token).json(&body);
        self.execute_json("heartbeat", request).await
    }

    async fn ping(&self, token: &str) -> Result<Ping> {
        let request = Self::authorized(self.http.get(self.url("ping")), token);
        self.execute_json("ping", request).await
    }

    async fn accept_job(&self, token: &str, job: &Job) -> Result<Job> {
        let path = format!("jobs/{}/accept", job.id);
        let request = Self::authorized(self.http.put(self.url(&path)), token);
        self.execute_json("accept", request).await
    }

    async fn start_job(&self, token: &str, job: &Job) -> Result<()> {
        let started_at = job.started_at.clone().unwrap_or_else(now_rfc3339);
        let body = StartRequest {
            started_at: &started_at,
        };
        let path = format!("jobs/{}/start", job.id);
        let request = Self::authorized(self.http.put(self.url(&path)), token).json(&body);
        self.execute("start", request).await.map(drop)
    }

    async fn finish_job(&self, token: &str, job: &Job) -> Result<()> {
        let body = FinishRequest {
            exit_status: job.exit_status.as_deref(),
            finished_at: job.finished_at.as_deref(),
            chunks_failed_count: 0,
        };
        let path = format!("jobs/{}/finish", job.id);
        let request = Self::authorized(self.http.put(self.url(&path)), token).json(&body);
        self.execute("finish", request).await.map(drop)
    }

    async fn upload_chunk(&self, token: &str, job_id: &str, chunk: &Chunk) -> Result<()> {
        let path = format!("jobs/{job_id}/chunks");
        let request = Self::authorized(self.http.post(self.url(&path)), token)
            .query(&[
                ("sequence", chunk.sequence),
                ("offset", chunk.offset),
                ("size", chunk.size),
            ])
            .header(header::CONTENT_TYPE, "text/plain")
            .body(chunk.data.clone());
        self.execute("chunks", request).await.map(drop)
    }
}
