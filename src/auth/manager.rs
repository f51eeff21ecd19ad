// Authentication manager
// Current token pair, persist-then-publish commits and request decoration

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, RequestBuilder};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use crate::error::Result;

use super::client::AuthorityClient;
use super::store::CredentialStore;
use super::types::TokenPair;

/// Authentication manager
/// Owns the current token pair and keeps memory and disk in step
pub struct AuthManager {
    /// Current token pair, read by every outgoing request
    tokens: RwLock<TokenPair>,

    /// Backing file; the mutex also serializes commits
    store: Mutex<CredentialStore>,

    /// Client for the market's appliance endpoints
    client: AuthorityClient,
}

impl AuthManager {
    /// Open the token file in `working_dir` and prepare the market client
    pub fn new(market_uri: &str, working_dir: &Path, http_timeout: Duration) -> Result<Self> {
        tracing::info!("Loading market tokens from {}", working_dir.display());
        let store = CredentialStore::open(working_dir)?;
        let client = AuthorityClient::new(market_uri, http_timeout)?;
        Ok(Self::from_parts(store, client))
    }

    pub fn from_parts(store: CredentialStore, client: AuthorityClient) -> Self {
        let tokens = store.load();
        Self {
            tokens: RwLock::new(tokens),
            store: Mutex::new(store),
            client,
        }
    }

    /// Snapshot of the current pair
    pub async fn current(&self) -> TokenPair {
        self.tokens.read().await.clone()
    }

    pub async fn is_registered(&self) -> bool {
        self.tokens.read().await.is_registered()
    }

    /// Register this appliance with a one-time code and store the tokens
    pub async fn register(&self, otp: &str) -> Result<TokenPair> {
        let tokens = self.client.register(otp).await?;
        self.commit(tokens.clone()).await?;
        tracing::info!("Appliance registered, tokens stored");
        Ok(tokens)
    }

    /// Refresh the pair using the current refresh token
    ///
    /// On failure nothing is touched; the old pair stays current.
    pub async fn refresh(&self) -> Result<TokenPair> {
        let refresh_token = self.tokens.read().await.refresh.clone();
        let tokens = self.client.refresh(&refresh_token).await?;
        self.commit(tokens.clone()).await?;
        Ok(tokens)
    }

    /// Check the current access token against the market
    pub async fn verify(&self) -> Result<()> {
        let access_token = self.tokens.read().await.access.clone();
        self.client.verify(&access_token).await
    }

    /// Persist first, then publish
    async fn commit(&self, tokens: TokenPair) -> Result<()> {
        let mut store = self.store.lock().await;
        store.persist(&tokens).await?;
        *self.tokens.write().await = tokens;
        Ok(())
    }

    async fn bearer_header(&self) -> Option<HeaderValue> {
        let tokens = self.tokens.read().await;
        match HeaderValue::from_str(&format!("Bearer {}", tokens.access)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(e) => {
                tracing::error!("Access token is not a valid header value: {}", e);
                None
            }
        }
    }

    /// Set the Authorization header of an outgoing market request
    pub async fn attach(&self, request: &mut Request) {
        if let Some(value) = self.bearer_header().await {
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }

    /// Builder flavour of [`AuthManager::attach`]
    pub async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.bearer_header().await {
            Some(value) => builder.header(AUTHORIZATION, value),
            None => builder,
        }
    }
}
