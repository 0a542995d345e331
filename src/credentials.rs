//! # Credentials
//!
//! Retrieves the Claude Code OAuth access token from the platform secret store
//! and keeps it in memory for the life of the process.
//!
//! Store lookups are throttled: on macOS every `security` call may raise an
//! interactive Keychain prompt, so a stale token that the store keeps
//! rejecting must not turn into a prompt per refresh.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::CredentialError;

/// Minimum spacing between two real store lookups.
pub const STORE_COOLDOWN_SECONDS: i64 = 30;

const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";
/// `security` exits with errSecItemNotFound (44) when no matching item exists.
const SECURITY_ITEM_NOT_FOUND: i32 = 44;

static ACCESS_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""accessToken"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

/// A place the raw credentials payload can be read from.
pub trait SecretBackend: Send + Sync {
    /// Return the stored payload (a JSON document) for the current user.
    fn read_secret(&self) -> Result<String, CredentialError>;
}

/// macOS Keychain generic password, read via the `security` CLI.
#[derive(Debug, Clone)]
pub struct KeychainBackend {
    service: String,
    account: String,
}

impl KeychainBackend {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// Service/account pair Claude Code itself writes to.
    pub fn for_current_user() -> Option<Self> {
        let account = env::var("USER").ok()?;
        Some(Self::new(keychain_service_name(), account))
    }
}

impl SecretBackend for KeychainBackend {
    fn read_secret(&self) -> Result<String, CredentialError> {
        let output = Command::new("security")
            .args([
                "find-generic-password",
                "-a",
                &self.account,
                "-s",
                &self.service,
                "-w",
            ])
            .output()
            .map_err(|e| {
                warn!(error = %e, "failed to run security");
                CredentialError::Store(-1)
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(if code == SECURITY_ITEM_NOT_FOUND {
                CredentialError::NotFound
            } else {
                CredentialError::Store(code)
            });
        }

        let payload = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if payload.is_empty() {
            return Err(CredentialError::NotFound);
        }
        Ok(payload)
    }
}

/// `~/.claude/.credentials.json`, where Claude Code keeps the same document on
/// Linux and Windows.
#[derive(Debug, Clone)]
pub struct CredentialsFileBackend {
    path: PathBuf,
}

impl CredentialsFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretBackend for CredentialsFileBackend {
    fn read_secret(&self) -> Result<String, CredentialError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if !raw.trim().is_empty() => Ok(raw),
            Ok(_) => Err(CredentialError::NotFound),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CredentialError::NotFound),
            Err(e) => Err(CredentialError::Store(e.raw_os_error().unwrap_or(-1))),
        }
    }
}

/// Pick the secret backend for this platform.
pub fn default_backend(claude_dir: &std::path::Path) -> Box<dyn SecretBackend> {
    #[cfg(target_os = "macos")]
    {
        if let Some(keychain) = KeychainBackend::for_current_user() {
            return Box::new(keychain);
        }
    }
    Box::new(CredentialsFileBackend::new(claude_dir.join(".credentials.json")))
}

/// Keychain service name; Claude Code appends the first 8 hex digits of
/// SHA-256(`CLAUDE_CONFIG_DIR`) when a custom config dir is in use.
pub fn keychain_service_name() -> String {
    use sha2::{Digest, Sha256};

    let mut service_name = KEYCHAIN_SERVICE.to_string();
    if let Ok(config_dir) = env::var("CLAUDE_CONFIG_DIR") {
        if !config_dir.trim().is_empty() {
            let mut hasher = Sha256::new();
            hasher.update(config_dir.as_bytes());
            let hash = hasher.finalize();
            let suffix = format!("{:x}", hash).chars().take(8).collect::<String>();
            service_name.push('-');
            service_name.push_str(&suffix);
        }
    }
    service_name
}

#[derive(Debug, Default)]
struct CredentialCache {
    cached_value: Option<String>,
    last_fetch_attempt: Option<DateTime<Utc>>,
}

/// Cached, throttled access to the OAuth token.
pub struct SecretStore {
    backend: Box<dyn SecretBackend>,
    cooldown: Duration,
    cache: Mutex<CredentialCache>,
}

impl SecretStore {
    pub fn new(backend: Box<dyn SecretBackend>) -> Self {
        Self {
            backend,
            cooldown: Duration::seconds(STORE_COOLDOWN_SECONDS),
            cache: Mutex::new(CredentialCache::default()),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn get_token(&self, force_refresh: bool) -> Result<String, CredentialError> {
        self.get_token_at(force_refresh, Utc::now())
    }

    /// Like [`get_token`](Self::get_token) with an explicit clock reading.
    pub fn get_token_at(
        &self,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<String, CredentialError> {
        // Held across the lookup so concurrent callers never double-prompt.
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        if !force_refresh {
            if let Some(token) = cache.cached_value.as_ref() {
                return Ok(token.clone());
            }
        }

        if let Some(last) = cache.last_fetch_attempt {
            if now - last < self.cooldown {
                debug!(
                    since_last_secs = (now - last).num_seconds(),
                    "credential store lookup throttled"
                );
                return Err(CredentialError::NotFound);
            }
        }

        cache.last_fetch_attempt = Some(now);
        let payload = self.backend.read_secret()?;
        let token = extract_access_token(&payload)?;
        debug!(token_len = token.len(), "credential loaded from store");
        cache.cached_value = Some(token.clone());
        Ok(token)
    }

    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cached_value = None;
    }

    pub fn reset_throttle(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_fetch_attempt = None;
    }
}

/// Pull `claudeAiOauth.accessToken` out of the stored document.
///
/// The payload can be truncated by the writer, so when it does not parse we
/// fall back to matching the field in the raw text.
pub fn extract_access_token(payload: &str) -> Result<String, CredentialError> {
    let structured = serde_json::from_str::<serde_json::Value>(payload.trim())
        .ok()
        .and_then(|json| {
            json.get("claudeAiOauth")
                .and_then(|v| v.get("accessToken"))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty());
    if let Some(token) = structured {
        return Ok(token);
    }

    let token = ACCESS_TOKEN_RE
        .captures(payload)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_json_string(m.as_str()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(CredentialError::Parse)?;
    debug!("credential recovered from malformed payload");
    Ok(token)
}

fn unescape_json_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('/') => out.push('/'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeBackend {
        calls: Arc<AtomicUsize>,
        result: Result<String, CredentialError>,
    }

    impl SecretBackend for FakeBackend {
        fn read_secret(&self) -> Result<String, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn store_with(result: Result<String, CredentialError>) -> (SecretStore, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = FakeBackend {
            calls: calls.clone(),
            result,
        };
        (SecretStore::new(Box::new(backend)), calls)
    }

    const PAYLOAD: &str = r#"{"claudeAiOauth":{"accessToken":"sk-ant-oat01-abc","refreshToken":"r"}}"#;

    #[test]
    fn cached_token_skips_the_store() {
        let (store, calls) = store_with(Ok(PAYLOAD.to_string()));
        let now = Utc::now();
        assert_eq!(store.get_token_at(false, now).unwrap(), "sk-ant-oat01-abc");
        assert_eq!(store.get_token_at(false, now).unwrap(), "sk-ant-oat01-abc");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_lookups_are_throttled_within_cooldown() {
        let (store, calls) = store_with(Err(CredentialError::Store(51)));
        let now = Utc::now();
        assert_eq!(store.get_token_at(false, now), Err(CredentialError::Store(51)));
        assert_eq!(
            store.get_token_at(false, now + Duration::seconds(10)),
            Err(CredentialError::NotFound)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Past the cooldown the store is consulted again.
        assert_eq!(
            store.get_token_at(false, now + Duration::seconds(31)),
            Err(CredentialError::Store(51))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forced_refresh_within_cooldown_is_throttled_even_after_success() {
        let (store, calls) = store_with(Ok(PAYLOAD.to_string()));
        let now = Utc::now();
        store.get_token_at(false, now).unwrap();
        assert_eq!(
            store.get_token_at(true, now + Duration::seconds(5)),
            Err(CredentialError::NotFound)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_throttle_and_clear_cache_allow_a_fresh_lookup() {
        let (store, calls) = store_with(Ok(PAYLOAD.to_string()));
        let now = Utc::now();
        store.get_token_at(false, now).unwrap();
        store.clear_cache();
        store.reset_throttle();
        store.get_token_at(false, now + Duration::seconds(1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn truncated_payload_falls_back_to_pattern_extraction() {
        let truncated = r#"{"claudeAiOauth":{"accessToken":"tok\"en\\x","refreshTok"#;
        assert_eq!(extract_access_token(truncated).unwrap(), r#"tok"en\x"#);
    }

    #[test]
    fn payload_without_token_is_a_parse_error() {
        assert_eq!(
            extract_access_token(r#"{"claudeAiOauth":{}}"#),
            Err(CredentialError::Parse)
        );
        assert_eq!(extract_access_token("garbage"), Err(CredentialError::Parse));
    }

    #[test]
    fn parse_error_surfaces_from_store() {
        let (store, _) = store_with(Ok("not json".to_string()));
        assert_eq!(store.get_token(false), Err(CredentialError::Parse));
    }

    #[test]
    fn credentials_file_backend_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = CredentialsFileBackend::new(dir.path().join(".credentials.json"));
        assert_eq!(backend.read_secret(), Err(CredentialError::NotFound));

        fs::write(dir.path().join(".credentials.json"), PAYLOAD).unwrap();
        assert_eq!(backend.read_secret().unwrap(), PAYLOAD);
    }

    #[test]
    #[serial_test::serial]
    fn service_name_gets_config_dir_suffix() {
        // SAFETY: serialized with other env-mutating tests
        unsafe { env::remove_var("CLAUDE_CONFIG_DIR") };
        assert_eq!(keychain_service_name(), "Claude Code-credentials");

        unsafe { env::set_var("CLAUDE_CONFIG_DIR", "/tmp/claude-alt") };
        let name = keychain_service_name();
        unsafe { env::remove_var("CLAUDE_CONFIG_DIR") };
        let suffix = name.strip_prefix("Claude Code-credentials-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
