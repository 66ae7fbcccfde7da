//! HTTP client for a remote engine, used by the CLI.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::aggregate::AggregatedView;
use crate::api::{
    CancelJobResponse, ContributionRequest, ContributionResponse, ErrorBody, ListJobsQuery,
    ListJobsResponse, SubmitJobRequest, SubmitJobResponse,
};
use crate::engine::EngineStats;
use crate::error::{ClientError, PollError};
use crate::poller::StatusSource;
use crate::scheduler::JobSnapshot;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// `addr` may be `host:port` or a full `http://` URL.
    pub fn new(addr: &str) -> Self {
        let base_url = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", addr.trim_end_matches('/'))
        };
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of a panel resource. The key is percent-encoded as a single path
    /// segment, so `/`, `?` and `#` in it stay part of the key.
    fn panel_url(&self, key: &str, action: Option<&str>) -> Result<Url, ClientError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?;
            segments.pop_if_empty().extend(["api", "panels", key]);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn submit(
        &self,
        kind: &str,
        payload: serde_json::Value,
        owner_id: &str,
    ) -> Result<Uuid, ClientError> {
        let body = SubmitJobRequest {
            kind: kind.to_string(),
            payload,
            owner_id: owner_id.to_string(),
        };
        let response: SubmitJobResponse = self
            .send(self.client.post(self.url("/api/jobs")).json(&body))
            .await?;
        Ok(response.job_id)
    }

    pub async fn status(&self, job_id: Uuid) -> Result<JobSnapshot, ClientError> {
        self.send(self.client.get(self.url(&format!("/api/jobs/{}", job_id))))
            .await
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelJobResponse, ClientError> {
        self.send(
            self.client
                .post(self.url(&format!("/api/jobs/{}/cancel", job_id))),
        )
        .await
    }

    pub async fn list(&self, query: &ListJobsQuery) -> Result<ListJobsResponse, ClientError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(owner) = &query.owner_id {
            params.push(("owner_id", owner.clone()));
        }
        if let Some(status) = &query.status {
            params.push(("status", status.clone()));
        }
        if let Some(kind) = &query.kind {
            params.push(("kind", kind.clone()));
        }
        if let Some(size) = query.page_size {
            params.push(("page_size", size.to_string()));
        }
        if let Some(token) = &query.page_token {
            params.push(("page_token", token.clone()));
        }
        self.send(self.client.get(self.url("/api/jobs")).query(&params))
            .await
    }

    pub async fn contribute(
        &self,
        key: &str,
        judge_role: &str,
        weight: f64,
        score: f64,
    ) -> Result<Uuid, ClientError> {
        let body = ContributionRequest {
            judge_role: judge_role.to_string(),
            weight,
            score,
        };
        let url = self.panel_url(key, Some("contributions"))?;
        let response: ContributionResponse =
            self.send(self.client.post(url).json(&body)).await?;
        Ok(response.contribution_id)
    }

    pub async fn panel(&self, key: &str) -> Result<AggregatedView, ClientError> {
        let url = self.panel_url(key, None)?;
        self.send(self.client.get(url)).await
    }

    pub async fn finalize(&self, key: &str) -> Result<AggregatedView, ClientError> {
        let url = self.panel_url(key, Some("finalize"))?;
        self.send(self.client.post(url)).await
    }

    pub async fn health(&self) -> Result<EngineStats, ClientError> {
        self.send(self.client.get(self.url("/api/health"))).await
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, job_id: Uuid) -> Result<JobSnapshot, PollError> {
        self.status(job_id).await.map_err(|e| match e {
            ClientError::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                PollError::NotFound(job_id)
            }
            other => PollError::Source(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_accepts_host_port() {
        let client = ApiClient::new("127.0.0.1:8080");
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn base_url_keeps_scheme_and_drops_trailing_slash() {
        let client = ApiClient::new("https://jobs.internal/");
        assert_eq!(client.base_url(), "https://jobs.internal");
    }

    #[test]
    fn panel_url_encodes_the_key_as_one_segment() {
        let client = ApiClient::new("127.0.0.1:8080");
        let url = client.panel_url("iv/1?x#y", None).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/panels/iv%2F1%3Fx%23y");

        let url = client.panel_url("iv-7", Some("finalize")).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/panels/iv-7/finalize");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn panel_url_keeps_a_base_path_prefix() {
        let client = ApiClient::new("https://jobs.internal/hiring/");
        let url = client.panel_url("iv 1", Some("contributions")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://jobs.internal/hiring/api/panels/iv%201/contributions"
        );
    }
}
