use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::GameSnapshot,
    protocol::{ActionResponse, ClientAction},
};
use tracing::debug;
use url::Url;

use crate::error::DispatchError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One logical request, one logical response. Implementations never retry
/// and never interpret payloads.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn send(&self, action: &ClientAction) -> Result<ActionResponse, DispatchError>;
    async fn fetch_state(&self) -> Result<GameSnapshot, DispatchError>;
}

pub struct UnavailableTransport;

#[async_trait]
impl ActionTransport for UnavailableTransport {
    async fn send(&self, action: &ClientAction) -> Result<ActionResponse, DispatchError> {
        Err(DispatchError::Unavailable(format!(
            "no server configured for {}",
            action.name()
        )))
    }

    async fn fetch_state(&self) -> Result<GameSnapshot, DispatchError> {
        Err(DispatchError::Unavailable(
            "no server configured for state load".to_string(),
        ))
    }
}

pub struct HttpTransport {
    http: Client,
    state_url: Url,
    action_url: Url,
    next_turn_url: Url,
}

impl HttpTransport {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let base = normalize_base_url(server_url)?;
        let endpoint = |path: &str| {
            base.join(path).map_err(|err| DispatchError::InvalidUrl {
                url: server_url.to_string(),
                reason: err.to_string(),
            })
        };
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            state_url: endpoint("api/state")?,
            action_url: endpoint("api/action")?,
            next_turn_url: endpoint("api/next_turn")?,
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DispatchError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ActionTransport for HttpTransport {
    async fn send(&self, action: &ClientAction) -> Result<ActionResponse, DispatchError> {
        debug!(action = action.name(), "dispatching action");
        let request = match action {
            ClientAction::NextTurn => self.http.post(self.next_turn_url.clone()),
            _ => self.http.post(self.action_url.clone()).json(action),
        };
        let response = request.send().await?;
        Self::read_json(response).await
    }

    async fn fetch_state(&self) -> Result<GameSnapshot, DispatchError> {
        debug!("fetching game state");
        let response = self.http.get(self.state_url.clone()).send().await?;
        Self::read_json(response).await
    }
}

/// Parses the configured server url and makes sure relative endpoint joins
/// append to its path instead of replacing the last segment.
pub fn normalize_base_url(raw: &str) -> Result<Url, DispatchError> {
    let trimmed = raw.trim();
    let invalid = |reason: String| DispatchError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
