//! Error types surfaced by the credential store and the usage API client.
//!
//! Both enums are `Clone` so a failure can be published inside
//! [`RefreshState::Failed`](crate::orchestrator::RefreshState) and shown to the
//! user as-is.

use thiserror::Error;

/// Failures while retrieving the OAuth credential from the secure store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error(
        "Claude Code credentials not found. Please ensure Claude Code is installed and logged in."
    )]
    NotFound,
    #[error("Credential store lookup failed with code {0}.")]
    Store(i32),
    #[error("Failed to parse stored credentials.")]
    Parse,
}

/// Failures of a single usage fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("Token expired. Please restart Claude Code or refresh manually.")]
    TokenExpired,
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(u16),
    #[error("Failed to decode response: {0}")]
    Decoding(String),
}

impl UsageError {
    /// Short machine-readable tag used in JSON output and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credential(CredentialError::NotFound) => "credential_not_found",
            Self::Credential(CredentialError::Store(_)) => "credential_store_error",
            Self::Credential(CredentialError::Parse) => "credential_parse_error",
            Self::TokenExpired => "token_expired",
            Self::Network(_) => "network_error",
            Self::Http(_) => "http_error",
            Self::Decoding(_) => "decoding_error",
        }
    }
}
