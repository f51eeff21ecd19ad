// Authenticated HTTP client for market calls

use reqwest::{Client, Request, RequestBuilder, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthManager;
use crate::error::{AuthError, Result};

/// HTTP client for authenticated market calls
pub struct MarketHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Source of the bearer token
    auth_manager: Arc<AuthManager>,
}

impl MarketHttpClient {
    /// Create a new HTTP client
    pub fn new(
        auth_manager: Arc<AuthManager>,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()?;

        Ok(Self {
            client,
            auth_manager,
        })
    }

    /// Start a request against the market; `execute` adds the token
    pub fn request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Attach the current access token and send once
    ///
    /// Non-2xx responses come back as `BadStatus`.
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        self.auth_manager.attach(&mut request).await;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending market request");

        let response = self.client.execute(request).await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "Market request failed");
            AuthError::Network(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %body,
                "Market returned error response"
            );
            return Err(AuthError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = %status, "Market request successful");
        Ok(response)
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthorityClient, CredentialStore, TokenPair};
    use chrono::{Duration as ChronoDuration, Utc};

    async fn manager_with_access(dir: &std::path::Path, access: &str) -> Arc<AuthManager> {
        let mut store = CredentialStore::open(dir).unwrap();
        store
            .persist(&TokenPair {
                access: access.to_string(),
                refresh: "r1".to_string(),
                expires: Utc::now() + ChronoDuration::hours(1),
            })
            .await
            .unwrap();
        let client = AuthorityClient::new("http://market.test", Duration::from_secs(1)).unwrap();
        Arc::new(AuthManager::from_parts(store, client))
    }

    #[tokio::test]
    async fn test_execute_attaches_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/jobs")
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = MarketHttpClient::new(manager_with_access(dir.path(), "a1").await, 4, 5, 5).unwrap();

        let request = client
            .request(reqwest::Method::POST, &format!("{}/jobs", server.url()))
            .body("{}")
            .build()
            .unwrap();
        let response = client.execute(request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_execute_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/jobs")
            .with_status(401)
            .with_body("bad token")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = MarketHttpClient::new(manager_with_access(dir.path(), "a1").await, 4, 5, 5).unwrap();

        let request = client
            .request(reqwest::Method::GET, &format!("{}/jobs", server.url()))
            .build()
            .unwrap();
        let err = client.execute(request).await.unwrap_err();

        match err {
            AuthError::BadStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
