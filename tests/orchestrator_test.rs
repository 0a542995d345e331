use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use claude_usage_monitor::automation::AutomationTrigger;
use claude_usage_monitor::credentials::{SecretBackend, SecretStore};
use claude_usage_monitor::error::{CredentialError, UsageError};
use claude_usage_monitor::history::LogAggregator;
use claude_usage_monitor::orchestrator::{RefreshOrchestrator, RefreshState, Scheduler};
use claude_usage_monitor::settings::{AppSettings, SettingsSource};
use claude_usage_monitor::usage_api::{TransportResponse, UsageApiClient, UsageTransport};

const OK_BODY: &str = r#"{
    "five_hour": {"utilization": 91.0, "resets_at": "2025-10-18T15:00:00Z"},
    "seven_day": {"utilization": 20.0, "resets_at": "2025-10-22T09:00:00Z"}
}"#;

struct StaticBackend;

impl SecretBackend for StaticBackend {
    fn read_secret(&self) -> Result<String, CredentialError> {
        Ok(r#"{"claudeAiOauth":{"accessToken":"tok"}}"#.to_string())
    }
}

/// Replays canned responses; optionally blocks each call until released.
#[derive(Clone, Default)]
struct FakeTransport {
    responses: Arc<Mutex<VecDeque<(u16, String)>>>,
    calls: Arc<AtomicUsize>,
    gate: Arc<Mutex<Option<Receiver<()>>>>,
}

impl FakeTransport {
    fn push(&self, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    fn gated(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }
}

impl UsageTransport for FakeTransport {
    fn get(&self, _url: &str, _headers: &[(&str, String)]) -> Result<TransportResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "connection refused".to_string())?;
        Ok(TransportResponse { status, body })
    }
}

fn orchestrator(
    transport: &FakeTransport,
    claude_dir: &Path,
    settings: AppSettings,
) -> Arc<RefreshOrchestrator> {
    let secrets = SecretStore::new(Box::new(StaticBackend)).with_cooldown(chrono::Duration::zero());
    let api = UsageApiClient::new(Arc::new(secrets), Box::new(transport.clone()));
    let settings: Arc<dyn SettingsSource> = Arc::new(settings);
    Arc::new(RefreshOrchestrator::new(
        Arc::new(api),
        LogAggregator::new(claude_dir),
        AutomationTrigger::new(),
        settings,
    ))
}

fn write_recent_transcript(claude_dir: &Path) {
    let dir = claude_dir.join("projects").join("proj");
    fs::create_dir_all(&dir).unwrap();
    let ts = (Utc::now() - chrono::Duration::minutes(10)).to_rfc3339();
    fs::write(
        dir.join("s.jsonl"),
        format!(
            r#"{{"type":"assistant","timestamp":"{ts}","message":{{"usage":{{"input_tokens":30,"output_tokens":12}}}}}}"#
        ),
    )
    .unwrap();
}

#[test]
fn starts_loading_and_loads_snapshot_with_history() {
    let dir = TempDir::new().unwrap();
    write_recent_transcript(dir.path());
    let transport = FakeTransport::default();
    transport.push(200, OK_BODY);
    let orch = orchestrator(&transport, dir.path(), AppSettings::default());

    assert!(orch.current().state.is_loading());
    assert!(orch.refresh());

    let state = orch.current();
    assert_eq!(state.five_hour_utilization(), Some(91.0));
    assert_eq!(state.seven_day_utilization(), Some(20.0));
    assert!(state.last_updated.is_some());
    let total: u64 = state.token_history.iter().map(|p| p.total_tokens()).sum();
    assert_eq!(total, 42);
    assert!(!orch.is_refreshing());
}

#[test]
fn overlapping_requests_are_dropped() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::default();
    transport.push(200, OK_BODY);
    let release = transport.gated();
    let orch = orchestrator(&transport, dir.path(), AppSettings::default());

    let worker = {
        let orch = orch.clone();
        thread::spawn(move || orch.refresh())
    };
    while !orch.is_refreshing() {
        thread::sleep(Duration::from_millis(5));
    }

    assert!(!orch.refresh());
    assert!(!orch.manual_refresh());
    release.send(()).unwrap();

    assert!(worker.join().unwrap());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(orch.current().state, RefreshState::Loaded(_)));
}

#[test]
fn failure_keeps_history_and_drops_snapshot() {
    let dir = TempDir::new().unwrap();
    write_recent_transcript(dir.path());
    let transport = FakeTransport::default();
    transport.push(200, OK_BODY);
    transport.push(503, "");
    let orch = orchestrator(&transport, dir.path(), AppSettings::default());

    orch.refresh();
    let loaded = orch.current();
    assert!(!loaded.token_history.is_empty());

    orch.refresh();
    let failed = orch.current();
    assert_eq!(failed.state, RefreshState::Failed(UsageError::Http(503)));
    assert_eq!(failed.five_hour_utilization(), None);
    assert!(Arc::ptr_eq(&failed.token_history, &loaded.token_history));
    assert_eq!(failed.last_updated, loaded.last_updated);
}

#[test]
fn repeated_unauthorized_latches_until_manual_refresh() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::default();
    transport.push(401, "");
    transport.push(401, "");
    let orch = orchestrator(&transport, dir.path(), AppSettings::default());

    orch.refresh();
    assert_eq!(orch.current().state, RefreshState::Failed(UsageError::TokenExpired));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

    // Latched: scheduled cycles do not touch the network.
    orch.refresh();
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

    transport.push(200, OK_BODY);
    assert!(orch.manual_refresh());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert_eq!(orch.current().five_hour_utilization(), Some(91.0));
}

#[cfg(unix)]
#[test]
fn automation_runs_only_after_successful_fetch() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("fired");
    let script = dir.path().join("hook.sh");
    fs::write(&script, format!("touch '{}'\n", marker.display())).unwrap();

    let mut settings = AppSettings::default();
    settings.automation.enabled = true;
    settings.automation.script_path = Some(script.to_string_lossy().into_owned());

    let transport = FakeTransport::default();
    transport.push(500, "");
    transport.push(200, OK_BODY);
    let orch = orchestrator(&transport, dir.path(), settings);

    orch.refresh();
    assert!(!marker.exists());

    orch.refresh();
    assert!(marker.exists());
}

#[test]
fn subscribers_see_published_states() {
    let dir = TempDir::new().unwrap();
    let transport = FakeTransport::default();
    transport.push(200, OK_BODY);
    let orch = orchestrator(&transport, dir.path(), AppSettings::default());
    let updates = orch.subscribe();

    let scheduler = Scheduler::start(orch.clone(), Duration::from_secs(3600)).unwrap();
    let first = updates.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.five_hour_utilization(), Some(91.0));
    scheduler.stop();

    // Loaded, then the history update.
    let second = updates.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(matches!(second.state, RefreshState::Loaded(_)));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}
