//! One-shot HTTP provisioning: creating a lobby and validating a join.
//!
//! Provisioning is the only HTTP in the crate; everything after it happens
//! on the streaming connection. Both operations validate their inputs
//! locally before any network call: an empty display name or lobby key is
//! inline field feedback, never a request.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, ValidationField, WordRaceError};

/// Header carrying the API key on provisioning requests.
pub const API_KEY_HEADER: &str = "x-api-key";

/// A successfully created lobby, surfaced only after the settling delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedLobby {
    pub lobby_key: String,
    pub display_name: String,
    pub weighted_words: bool,
}

/// Client for the one-shot provisioning exchanges.
#[derive(Debug, Clone)]
pub struct ProvisioningClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    settle_delay: Duration,
}

impl ProvisioningClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            settle_delay: config.settle_delay,
        }
    }

    /// Create a new lobby and return its key.
    ///
    /// The peer responds with the bare lobby key; anything non-numeric is a
    /// failure. On success this sleeps the fixed settling delay before
    /// returning, because the peer's lobby record is asynchronously
    /// consistent with the key it just handed out; connecting immediately
    /// would race it.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Validation`] for an empty display name
    /// (before any network I/O) and [`WordRaceError::Provisioning`] when the
    /// peer is unreachable or returns a non-numeric key.
    pub async fn create(
        &self,
        display_name: &str,
        weighted_words: bool,
    ) -> Result<ProvisionedLobby> {
        if display_name.trim().is_empty() {
            return Err(WordRaceError::Validation(ValidationField::DisplayName));
        }

        debug!(display_name, "creating lobby");
        let body = self
            .post("create", &[("display_name", display_name)])
            .await?;

        let key = body.trim().trim_matches('"');
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_digit()) {
            warn!(body = %body, "peer returned an invalid lobby key");
            return Err(WordRaceError::Provisioning(format!(
                "peer returned a non-numeric lobby key: {body:?}"
            )));
        }

        // Give the peer's lobby record time to settle before the key is
        // surfaced to the rest of the system.
        tokio::time::sleep(self.settle_delay).await;

        debug!(lobby_key = %key, "lobby created");
        Ok(ProvisionedLobby {
            lobby_key: key.to_string(),
            display_name: display_name.to_string(),
            weighted_words,
        })
    }

    /// Validate joining an existing lobby.
    ///
    /// Fails closed: only an explicit `true` response is affirmative, and
    /// any other body means "invalid lobby key" (`Ok(false)`), not a hard
    /// error. An empty lobby key never reaches the network.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Validation`] for an empty display name or
    /// lobby key, and [`WordRaceError::Provisioning`] when the peer is
    /// unreachable.
    pub async fn join(&self, lobby_key: &str, display_name: &str) -> Result<bool> {
        if display_name.trim().is_empty() {
            return Err(WordRaceError::Validation(ValidationField::DisplayName));
        }
        if lobby_key.trim().is_empty() {
            return Err(WordRaceError::Validation(ValidationField::LobbyKey));
        }

        debug!(lobby_key, display_name, "validating join");
        let body = self
            .post(
                "join",
                &[("lobby_key", lobby_key), ("display_name", display_name)],
            )
            .await?;

        let affirmative = body.trim() == "true";
        if !affirmative {
            debug!(lobby_key, body = %body, "join rejected by peer");
        }
        Ok(affirmative)
    }

    /// POST to a provisioning endpoint and return the response body.
    async fn post(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/{endpoint}", self.base_url))
            .query(query)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| WordRaceError::Provisioning(format!("peer unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WordRaceError::Provisioning(format!(
                "peer responded with status {status}"
            )));
        }

        response
            .text()
            .await
            .map_err(|e| WordRaceError::Provisioning(format!("unreadable response body: {e}")))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn client() -> ProvisioningClient {
        // Never reached by the validation tests.
        ProvisioningClient::new(&ClientConfig::new(
            "http://127.0.0.1:1",
            "ws://127.0.0.1:1",
            "wr_test_key",
        ))
    }

    #[tokio::test]
    async fn create_rejects_empty_display_name_locally() {
        let err = client().create("", true).await.unwrap_err();
        assert!(matches!(
            err,
            WordRaceError::Validation(ValidationField::DisplayName)
        ));
    }

    #[tokio::test]
    async fn join_rejects_empty_lobby_key_locally() {
        let err = client().join("  ", "Bob").await.unwrap_err();
        assert!(matches!(
            err,
            WordRaceError::Validation(ValidationField::LobbyKey)
        ));
    }

    #[tokio::test]
    async fn join_rejects_empty_display_name_locally() {
        let err = client().join("4821", "").await.unwrap_err();
        assert!(matches!(
            err,
            WordRaceError::Validation(ValidationField::DisplayName)
        ));
    }
}
