//! HTTP client for the orchestrator API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use evalwatch_monitor::{
    Allocation, AllocationStub, ApiError, Evaluation, EvaluationSource, QueryMeta, QueryOptions,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;

/// Header carrying the index of the data in a response.
pub const INDEX_HEADER: &str = "X-Nomad-Index";

/// Header carrying the ACL token.
pub const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Added to the blocking wait so long-polls are not cut short.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// API client for reading evaluations and allocations.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client from config.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = config.token() {
            let mut value = HeaderValue::from_str(token).context("Invalid token format")?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.blocking_wait().saturating_add(REQUEST_TIMEOUT_SLACK))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.address().to_string(),
        })
    }

    /// Build a URL for an endpoint, adding blocking-query parameters.
    fn url(&self, path: &str, query: &QueryOptions) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if query.is_blocking() {
            url.push_str(&format!("?index={}", query.wait_index));
            if let Some(wait) = query.wait_time {
                url.push_str(&format!("&wait={}s", wait.as_secs().max(1)));
            }
        }
        url
    }

    /// Make a GET request and decode the body.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryOptions,
    ) -> Result<(T, QueryMeta), ApiError> {
        let url = self.url(path, query);
        debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error(path, response).await);
        }

        let meta = QueryMeta {
            last_index: last_index(response.headers()),
        };
        let body = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        Ok((body, meta))
    }

    /// Turn a non-success response into an error.
    async fn handle_error(&self, path: &str, response: reqwest::Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = match body.trim() {
            "" => path.to_string(),
            text => text.to_string(),
        };

        if status == StatusCode::NOT_FOUND {
            ApiError::NotFound(message)
        } else {
            ApiError::Status {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// Index reported by the server; zero when missing or malformed.
fn last_index(headers: &HeaderMap) -> u64 {
    headers
        .get(INDEX_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl EvaluationSource for ApiClient {
    async fn evaluation(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Evaluation, QueryMeta), ApiError> {
        self.get(&format!("/v1/evaluation/{}", eval_id), query).await
    }

    async fn allocations(
        &self,
        eval_id: &str,
        query: &QueryOptions,
    ) -> Result<(Vec<AllocationStub>, QueryMeta), ApiError> {
        self.get(&format!("/v1/evaluation/{}/allocations", eval_id), query)
            .await
    }

    async fn allocation(&self, alloc_id: &str) -> Result<Allocation, ApiError> {
        let (alloc, _) = self
            .get(&format!("/v1/allocation/{}", alloc_id), &QueryOptions::default())
            .await?;
        Ok(alloc)
    }
}

#[cfg(test)]
mod tests {
    use evalwatch_monitor::{ClientStatus, DesiredStatus, EvalStatus};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer, token: Option<&str>) -> ApiClient {
        let config = Config {
            address: format!("{}/", server.uri()),
            token: token.map(str::to_string),
            ..Config::default()
        };
        ApiClient::new(&config).unwrap()
    }

    fn alloc_stub_json(id: &str) -> serde_json::Value {
        json!({
            "ID": id,
            "EvalID": "eval1",
            "JobID": "web",
            "TaskGroup": "frontend",
            "NodeID": "node1",
            "DesiredStatus": "run",
            "DesiredDescription": "",
            "ClientStatus": "running",
            "ClientDescription": null,
            "CreateIndex": 12,
            "ModifyIndex": 14
        })
    }

    #[test]
    fn test_url_building() {
        let config = Config {
            address: "http://127.0.0.1:4646/".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config).unwrap();

        assert_eq!(
            client.url("/v1/evaluation/eval1", &QueryOptions::default()),
            "http://127.0.0.1:4646/v1/evaluation/eval1"
        );
        assert_eq!(
            client.url(
                "/v1/evaluation/eval1/allocations",
                &QueryOptions::blocking(42, Duration::from_secs(5))
            ),
            "http://127.0.0.1:4646/v1/evaluation/eval1/allocations?index=42&wait=5s"
        );
    }

    #[test]
    fn test_huge_blocking_wait_still_builds() {
        let config = Config {
            blocking_wait_secs: u64::MAX,
            ..Config::default()
        };
        assert!(ApiClient::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_blocking_evaluation_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/evaluation/eval1"))
            .and(query_param("index", "20"))
            .and(query_param("wait", "5s"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(INDEX_HEADER, "21")
                    .set_body_json(json!({ "ID": "eval1", "Status": "complete" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let (eval, meta) = client
            .evaluation("eval1", &QueryOptions::blocking(20, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(eval.status, EvalStatus::Complete);
        assert_eq!(meta.last_index, 21);
    }

    #[test]
    fn test_last_index_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(last_index(&headers), 0);

        headers.insert(INDEX_HEADER, HeaderValue::from_static("17"));
        assert_eq!(last_index(&headers), 17);

        headers.insert(INDEX_HEADER, HeaderValue::from_static("soon"));
        assert_eq!(last_index(&headers), 0);
    }

    #[tokio::test]
    async fn test_evaluation_is_decoded_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/evaluation/eval1"))
            .and(header(TOKEN_HEADER, "secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(INDEX_HEADER, "15")
                    .set_body_json(json!({
                        "ID": "eval1",
                        "Status": "complete",
                        "TriggeredBy": "job-register",
                        "JobID": "web",
                        "NodeID": "",
                        "NextEval": "eval2",
                        "CreateIndex": 10,
                        "ModifyIndex": 15
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("secret"));
        let (eval, meta) = client
            .evaluation("eval1", &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(eval.status, EvalStatus::Complete);
        assert_eq!(eval.follow_up(), Some("eval2"));
        assert_eq!(meta.last_index, 15);
    }

    #[tokio::test]
    async fn test_blocking_allocation_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/evaluation/eval1/allocations"))
            .and(query_param("index", "14"))
            .and(query_param("wait", "5s"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(INDEX_HEADER, "16")
                    .set_body_json(json!([alloc_stub_json("alloc1")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let (allocs, meta) = client
            .allocations("eval1", &QueryOptions::blocking(14, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(allocs.len(), 1);
        assert_eq!(allocs[0].desired_status, DesiredStatus::Run);
        assert_eq!(allocs[0].client_status, ClientStatus::Running);
        assert_eq!(allocs[0].client_description, "");
        assert_eq!(meta.last_index, 16);
    }

    #[tokio::test]
    async fn test_missing_allocation_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/allocation/alloc9"))
            .respond_with(ResponseTemplate::new(404).set_body_string("alloc not found"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.allocation("alloc9").await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("alloc not found".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/evaluation/eval1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client
            .evaluation("eval1", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                status: 403,
                message: "Permission denied".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/evaluation/eval1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client
            .evaluation("eval1", &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = Config {
            address: "http://127.0.0.1:1".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config).unwrap();
        let err = client.allocation("alloc1").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "{err:?}");
    }
}
