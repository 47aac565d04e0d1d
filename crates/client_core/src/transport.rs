use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Difficulty, ProblemId},
    protocol::{AnswerOutcome, AnswerRequest, HealthStatus, NewProblemRequest, Problem},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Backend operations the session controller depends on. Implemented by
/// [`BackendApi`] over HTTP and by scripted doubles in tests.
#[async_trait]
pub trait ProblemBackend: Send + Sync {
    /// Server address shown in user-facing diagnostics.
    fn endpoint(&self) -> String;

    async fn new_problem(&self, difficulty: Difficulty) -> Result<Problem>;

    async fn submit_answer(&self, problem_id: &ProblemId, answer: &str) -> Result<AnswerOutcome>;
}

/// JSON-over-HTTP client for the problem service. Requests go to a fixed
/// base address; non-2xx responses become [`ApiClientError::Status`] with
/// the status line and raw body preserved. No retries, caching, or auth.
pub struct BackendApi {
    http: Client,
    base_url: String,
}

impl BackendApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn new_problem(&self, difficulty: Difficulty) -> Result<Problem, ApiClientError> {
        self.request_json(
            Method::POST,
            "/new-problem",
            Some(&NewProblemRequest { difficulty }),
        )
        .await
    }

    pub async fn submit_answer(
        &self,
        problem_id: &ProblemId,
        answer: &str,
    ) -> Result<AnswerOutcome, ApiClientError> {
        let request = AnswerRequest {
            problem_id: problem_id.clone(),
            answer: answer.to_string(),
        };
        self.request_json(Method::POST, "/answer", Some(&request))
            .await
    }

    pub async fn health(&self) -> Result<bool, ApiClientError> {
        let status: HealthStatus = self
            .request_json::<(), _>(Method::GET, "/healthz", None)
            .await?;
        Ok(status.ok)
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug_assert!(path.starts_with('/'));
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "api: request");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|source| ApiClientError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "api: non-success response");
            return Err(ApiClientError::Status { url, status, body });
        }

        response
            .json()
            .await
            .map_err(|source| ApiClientError::Decode { url, source })
    }
}

#[async_trait]
impl ProblemBackend for BackendApi {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn new_problem(&self, difficulty: Difficulty) -> Result<Problem> {
        Ok(BackendApi::new_problem(self, difficulty).await?)
    }

    async fn submit_answer(&self, problem_id: &ProblemId, answer: &str) -> Result<AnswerOutcome> {
        Ok(BackendApi::submit_answer(self, problem_id, answer).await?)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
