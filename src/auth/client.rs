// Sealing market authority endpoints

use chrono::Utc;
use reqwest::header::HeaderValue;
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Duration;

use crate::error::{AuthError, Result};

use super::types::{TokenPair, TokenResponse};

/// Append percent-encoded path segments to the market base URL
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // Only cannot-be-a-base URLs fail here, and `new` rejects those
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Get register URL for a one-time code
fn register_url(base: &Url, otp: &str) -> Url {
    endpoint(base, &["appliance", "register", otp])
}

fn verify_url(base: &Url) -> Url {
    endpoint(base, &["appliance", "verify"])
}

fn refresh_url(base: &Url) -> Url {
    endpoint(base, &["appliance", "refresh"])
}

/// Get machine fingerprint for User-Agent
fn get_machine_fingerprint() -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let mut hasher = DefaultHasher::new();
    hostname.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Stateless client for the appliance endpoints of the market
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: Client,
    base_url: Url,
}

impl AuthorityClient {
    /// Create a client with a bounded per-request timeout
    pub fn new(base_uri: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_uri).map_err(|e| AuthError::InvalidUri {
            uri: base_uri.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AuthError::InvalidUri {
                uri: base_uri.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "market-auth/{}-{}",
                env!("CARGO_PKG_VERSION"),
                get_machine_fingerprint()
            ))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchange a one-time code for the first token pair
    pub async fn register(&self, otp: &str) -> Result<TokenPair> {
        tracing::info!("Registering appliance with market at {}", self.base_url);

        let response = self
            .client
            .post(register_url(&self.base_url, otp))
            .header("Content-Type", "text/plain")
            .send()
            .await?;

        read_token_response(response).await
    }

    /// Ask the market whether the access token is still accepted
    pub async fn verify(&self, access_token: &str) -> Result<()> {
        let response = self
            .client
            .get(verify_url(&self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AuthError::Validation {
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    /// Trade the refresh token for a new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        tracing::debug!("Refreshing market tokens...");

        let response = self
            .client
            .post(refresh_url(&self.base_url))
            .bearer_auth(refresh_token)
            .send()
            .await?;

        read_token_response(response).await
    }
}

/// Shared status/body handling for register and refresh
async fn read_token_response(response: Response) -> Result<TokenPair> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::BadStatus {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    let data: TokenResponse =
        serde_json::from_str(&body).map_err(|e| AuthError::parse("token response", e))?;

    if data.access.is_empty() || data.refresh.is_empty() {
        return Err(AuthError::invalid("token response is missing a token"));
    }

    // Both tokens travel as `Authorization: Bearer ..` later on
    for token in [&data.access, &data.refresh] {
        if HeaderValue::from_str(&format!("Bearer {}", token)).is_err() {
            return Err(AuthError::invalid(
                "token response contains characters not allowed in a header",
            ));
        }
    }

    let ttl = data.ttl;
    let tokens = data.issue_at(Utc::now())?;

    tracing::info!(
        "Got tokens from market, expires: {} ({} seconds from now)",
        tokens.expires.to_rfc3339(),
        ttl
    );

    Ok(tokens)
}
