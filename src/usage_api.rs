//! # Usage API
//!
//! Client for the Claude OAuth usage endpoint. A 401 is retried exactly once
//! with a credential forced fresh from the secret store; a second 401 latches
//! the client into a "token expired" state that short-circuits every later
//! call until [`UsageApiClient::reset_token_state`] is invoked.

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::credentials::SecretStore;
use crate::error::UsageError;
use crate::models::UsageSnapshot;
use crate::utils::env_non_empty;

pub const USAGE_ENDPOINT: &str = "https://api.anthropic.com/api/oauth/usage";
const ANTHROPIC_BETA: &str = "oauth-2025-04-20";
const DEFAULT_CLAUDE_CODE_VERSION: &str = "2.0.31";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

static USER_AGENT: Lazy<String> = Lazy::new(resolve_user_agent);

fn resolve_user_agent() -> String {
    if let Some(explicit) = env_non_empty("CLAUDE_USAGE_MONITOR_USER_AGENT") {
        return explicit;
    }
    let version = env_non_empty("CLAUDE_CODE_VERSION")
        .unwrap_or_else(|| DEFAULT_CLAUDE_CODE_VERSION.to_string());
    format!("claude-code/{version}")
}

/// Raw HTTP result handed back by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Performs the GET. `Err` means the request never produced a status line.
pub trait UsageTransport: Send + Sync {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<TransportResponse, String>;
}

/// Blocking HTTPS transport backed by `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageTransport for UreqTransport {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<TransportResponse, String> {
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let mut response = request.call().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| e.to_string())?;
        Ok(TransportResponse { status, body })
    }
}

pub struct UsageApiClient {
    secrets: Arc<SecretStore>,
    transport: Box<dyn UsageTransport>,
    token_expired: AtomicBool,
}

impl UsageApiClient {
    pub fn new(secrets: Arc<SecretStore>, transport: Box<dyn UsageTransport>) -> Self {
        Self {
            secrets,
            transport,
            token_expired: AtomicBool::new(false),
        }
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    pub fn is_token_expired(&self) -> bool {
        self.token_expired.load(Ordering::SeqCst)
    }

    /// Clear the expiry latch. Only the manual refresh path calls this.
    pub fn reset_token_state(&self) {
        self.token_expired.store(false, Ordering::SeqCst);
    }

    pub fn fetch_usage(&self) -> Result<UsageSnapshot, UsageError> {
        if self.is_token_expired() {
            debug!("token known expired; skipping usage fetch");
            return Err(UsageError::TokenExpired);
        }

        let result = match self.fetch_once(false) {
            Err(UsageError::TokenExpired) => {
                info!("usage endpoint rejected cached token; retrying with fresh credential");
                let retry = self.fetch_once(true);
                if matches!(retry, Err(UsageError::TokenExpired)) {
                    warn!("fresh credential rejected as well; latching token expiry");
                    self.token_expired.store(true, Ordering::SeqCst);
                }
                retry
            }
            other => other,
        };

        if result.is_ok() {
            self.token_expired.store(false, Ordering::SeqCst);
        }
        result
    }

    fn fetch_once(&self, force_refresh: bool) -> Result<UsageSnapshot, UsageError> {
        let token = self.secrets.get_token(force_refresh)?;
        let headers = request_headers(&token);
        let response = self
            .transport
            .get(USAGE_ENDPOINT, &headers)
            .map_err(UsageError::Network)?;
        classify_response(response)
    }
}

pub fn request_headers(token: &str) -> Vec<(&'static str, String)> {
    vec![
        ("Authorization", format!("Bearer {token}")),
        ("User-Agent", USER_AGENT.clone()),
        ("anthropic-beta", ANTHROPIC_BETA.to_string()),
        ("Accept", "application/json".to_string()),
    ]
}

pub fn classify_response(response: TransportResponse) -> Result<UsageSnapshot, UsageError> {
    match response.status {
        200 => decode_snapshot(&response.body),
        401 => Err(UsageError::TokenExpired),
        status => Err(UsageError::Http(status)),
    }
}

pub fn decode_snapshot(body: &str) -> Result<UsageSnapshot, UsageError> {
    serde_json::from_str(body).map_err(|e| UsageError::Decoding(e.to_string()))
}
