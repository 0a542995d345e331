//! # Refresh Orchestrator
//!
//! Drives one refresh cycle at a time: fetch the usage snapshot, then (only on
//! success) rebuild the token history and evaluate the automation rule against
//! that same snapshot.
//!
//! Cycles never overlap. A request that arrives while a cycle is running is
//! dropped rather than queued; the next tick picks up fresh state anyway.
//! Published state is an `Arc<MonitorState>` swapped wholesale, so readers see
//! either the previous value or the next one, never a mix.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::automation::AutomationTrigger;
use crate::error::UsageError;
use crate::history::LogAggregator;
use crate::models::{TokenDataPoint, UsageSnapshot};
use crate::settings::SettingsSource;
use crate::usage_api::UsageApiClient;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshState {
    Loading,
    Loaded(Arc<UsageSnapshot>),
    Failed(UsageError),
}

impl RefreshState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn snapshot(&self) -> Option<&UsageSnapshot> {
        match self {
            Self::Loaded(s) => Some(s),
            _ => None,
        }
    }
}

/// Everything a consumer renders, published as one value per update.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub state: RefreshState,
    pub last_updated: Option<DateTime<Utc>>,
    pub token_history: Arc<Vec<TokenDataPoint>>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            state: RefreshState::Loading,
            last_updated: None,
            token_history: Arc::new(Vec::new()),
        }
    }
}

impl MonitorState {
    pub fn five_hour_utilization(&self) -> Option<f64> {
        self.state.snapshot().map(|s| s.five_hour.utilization)
    }

    pub fn seven_day_utilization(&self) -> Option<f64> {
        self.state.snapshot().map(|s| s.seven_day.utilization)
    }

    pub fn opus_utilization(&self) -> Option<f64> {
        self.state
            .snapshot()
            .and_then(|s| s.seven_day_opus.as_ref())
            .map(|b| b.utilization)
    }

    pub fn sonnet_utilization(&self) -> Option<f64> {
        self.state
            .snapshot()
            .and_then(|s| s.seven_day_sonnet.as_ref())
            .map(|b| b.utilization)
    }

    pub fn five_hour_reset_time(&self) -> Option<DateTime<Utc>> {
        self.state.snapshot().and_then(|s| s.five_hour.resets_at)
    }

    pub fn seven_day_reset_time(&self) -> Option<DateTime<Utc>> {
        self.state.snapshot().and_then(|s| s.seven_day.resets_at)
    }
}

/// Serialized form used by `--json`.
#[derive(Serialize)]
pub struct MonitorStateJson<'a> {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<&'a UsageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub last_updated: Option<DateTime<Utc>>,
    pub token_history: &'a [TokenDataPoint],
}

impl<'a> From<&'a MonitorState> for MonitorStateJson<'a> {
    fn from(value: &'a MonitorState) -> Self {
        let (state, usage, error) = match &value.state {
            RefreshState::Loading => ("loading", None, None),
            RefreshState::Loaded(s) => ("loaded", Some(s.as_ref()), None),
            RefreshState::Failed(e) => ("failed", None, Some(e)),
        };
        MonitorStateJson {
            state,
            usage,
            error: error.map(|e| e.to_string()),
            error_kind: error.map(|e| e.kind()),
            last_updated: value.last_updated,
            token_history: value.token_history.as_slice(),
        }
    }
}

/// Holds the in-flight flag for the life of one cycle.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshOrchestrator {
    api: Arc<UsageApiClient>,
    history: LogAggregator,
    automation: AutomationTrigger,
    settings: Arc<dyn SettingsSource>,
    in_flight: AtomicBool,
    published: Mutex<Arc<MonitorState>>,
    subscribers: Mutex<Vec<Sender<Arc<MonitorState>>>>,
}

impl RefreshOrchestrator {
    pub fn new(
        api: Arc<UsageApiClient>,
        history: LogAggregator,
        automation: AutomationTrigger,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            api,
            history,
            automation,
            settings,
            in_flight: AtomicBool::new(false),
            published: Mutex::new(Arc::new(MonitorState::default())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Latest published state.
    pub fn current(&self) -> Arc<MonitorState> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receive every state published from now on.
    pub fn subscribe(&self) -> Receiver<Arc<MonitorState>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle. Returns false without doing anything if a cycle is
    /// already in flight.
    pub fn refresh(&self) -> bool {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("refresh already in flight; dropping request");
            return false;
        };
        self.run_cycle();
        true
    }

    /// User-initiated refresh: forget the expiry latch and the cached
    /// credential so the cycle re-authenticates from scratch.
    pub fn manual_refresh(&self) -> bool {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("refresh already in flight; dropping manual request");
            return false;
        };
        info!("manual refresh: resetting token state");
        self.api.reset_token_state();
        self.api.secrets().clear_cache();
        self.api.secrets().reset_throttle();
        self.run_cycle();
        true
    }

    fn run_cycle(&self) {
        match self.api.fetch_usage() {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let completed = Utc::now();
                info!(
                    five_hour = snapshot.five_hour.utilization,
                    seven_day = snapshot.seven_day.utilization,
                    "usage refreshed"
                );
                self.publish(|prev| MonitorState {
                    state: RefreshState::Loaded(snapshot.clone()),
                    last_updated: Some(completed),
                    token_history: prev.token_history.clone(),
                });

                let settings = self.settings.current();
                let history = self.history.fetch_history(settings.graph.time_window_hours);
                self.publish(|prev| MonitorState {
                    token_history: Arc::new(history),
                    ..prev.clone()
                });

                self.automation.evaluate(
                    snapshot.five_hour.utilization,
                    snapshot.seven_day.utilization,
                    &settings.automation,
                );
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "usage refresh failed");
                self.publish(|prev| MonitorState {
                    state: RefreshState::Failed(e),
                    ..prev.clone()
                });
            }
        }
    }

    fn publish(&self, next: impl FnOnce(&MonitorState) -> MonitorState) {
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = Arc::new(next(&published));
        *published = state.clone();

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(state.clone()).is_ok());
    }
}

/// Background worker that refreshes immediately and then on every interval.
pub struct Scheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        orchestrator: Arc<RefreshOrchestrator>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = orchestrator.clone();
        let handle = thread::Builder::new()
            .name("usage-refresh".to_string())
            .spawn(move || {
                loop {
                    worker.refresh();
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                debug!("refresh scheduler stopped");
            })?;
        Ok(Self {
            orchestrator,
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Fire a manual refresh off the caller's thread. Dropped if a cycle is
    /// already running.
    pub fn request_manual_refresh(&self) {
        let orchestrator = self.orchestrator.clone();
        let spawned = thread::Builder::new()
            .name("usage-manual-refresh".to_string())
            .spawn(move || {
                orchestrator.manual_refresh();
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start manual refresh");
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
