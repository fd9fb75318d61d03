//! REST collaborators
//!
//! Four server endpoints back the socket session up: the send fallback, the
//! paginated message history, the counterpart directory, and the assembled
//! conversation list. Every call carries a bounded request timeout so a hung
//! request degrades into the engine's cache-fallback path instead of pinning
//! the loading state forever.

use crate::auth::AuthContext;
use crate::protocol::{SendPayload, WireConversation, WireMessage, WireProfile};
use crate::Result;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on every REST request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Directory fetch retry attempts
const DIRECTORY_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for directory retry backoff (milliseconds)
const DIRECTORY_RETRY_BASE_MS: u64 = 500;

/// API seam the engine is built against
///
/// [`RestApi`] is the production implementation; tests inject scripted mocks.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Send a message over REST (socket-unavailable fallback)
    ///
    /// Returns the stored message as the server recorded it.
    async fn send_message(&self, payload: &SendPayload) -> Result<WireMessage>;

    /// Fetch one history page for a conversation pair, oldest-ward
    async fn fetch_history(
        &self,
        user_id: &str,
        counterpart_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<WireMessage>>;

    /// Fetch all known counterpart identities/profiles
    async fn fetch_directory(&self) -> Result<Vec<WireProfile>>;

    /// Fetch the assembled conversation previews for an identity
    async fn fetch_conversations(&self, user_id: &str) -> Result<Vec<WireConversation>>;
}

/// reqwest-backed implementation of the API seam
pub struct RestApi {
    base_url: String,
    client: reqwest::Client,
    auth: Arc<dyn AuthContext>,
}

impl RestApi {
    /// Create an API client for the given base URL
    ///
    /// The bearer token is re-derived from the auth collaborator on every
    /// request, never captured at construction time.
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthContext>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            auth,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_directory_once(&self) -> Result<Vec<WireProfile>> {
        let url = format!("{}/api/users", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChatApi for RestApi {
    async fn send_message(&self, payload: &SendPayload) -> Result<WireMessage> {
        let url = format!("{}/api/messages", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_history(
        &self,
        user_id: &str,
        counterpart_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<WireMessage>> {
        let url = format!("{}/api/messages/history", self.base_url);
        let page = page.to_string();
        let size = page_size.to_string();
        let response = self
            .authorize(self.client.get(&url).query(&[
                ("userId", user_id),
                ("counterpartId", counterpart_id),
                ("page", page.as_str()),
                ("size", size.as_str()),
            ]))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_directory(&self) -> Result<Vec<WireProfile>> {
        let mut last_error = None;
        for attempt in 0..DIRECTORY_RETRY_ATTEMPTS {
            match self.fetch_directory_once().await {
                Ok(profiles) => {
                    debug!("Directory fetch returned {} profiles", profiles.len());
                    return Ok(profiles);
                }
                Err(e) => {
                    warn!(
                        "Directory fetch attempt {}/{} failed: {}",
                        attempt + 1,
                        DIRECTORY_RETRY_ATTEMPTS,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < DIRECTORY_RETRY_ATTEMPTS {
                        let backoff = DIRECTORY_RETRY_BASE_MS * 2_u64.pow(attempt);
                        let jitter = rand::thread_rng().gen_range(0..250);
                        tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| crate::Error::Api("directory fetch failed".to_string())))
    }

    async fn fetch_conversations(&self, user_id: &str) -> Result<Vec<WireConversation>> {
        let url = format!("{}/api/conversations", self.base_url);
        let response = self
            .authorize(self.client.get(&url).query(&[("userId", user_id)]))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
