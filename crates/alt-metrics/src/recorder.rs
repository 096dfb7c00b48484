// recorder.rs - MetricsRecorder: in-memory event buffer with periodic flush.
//
// Logging calls only append to an in-memory Vec under a mutex and return.
// A background thread rewrites the whole metrics file from that Vec on a
// fixed interval, and once more when the recorder is stopped. The same
// mutex guards both the append and the file write, so a flush always
// persists an internally consistent snapshot.
//
// On construction any existing file is loaded and raw user identifiers
// left over from before anonymization are migrated to digests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;

use crate::config::MetricsConfig;
use crate::error::MetricsError;
use crate::event::{Details, EventKind, MetricEvent};
use crate::hasher;
use crate::store::EventStore;

/// Convert GPU draw over a generation into kilowatt-hours.
///
/// `(watts × ms) / (1000 × 3600)`: a straight unit conversion.
pub fn power_consumption_kwh(response_time_ms: i64, gpu_watts: f64) -> f64 {
    (gpu_watts * response_time_ms as f64) / (1000.0 * 3600.0)
}

/// State shared between the recorder handle and its flush thread.
struct Shared {
    store: EventStore,
    events: Mutex<Vec<MetricEvent>>,
}

impl Shared {
    fn lock_events(&self) -> MutexGuard<'_, Vec<MetricEvent>> {
        self.events.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!("metrics buffer lock was poisoned; continuing with its contents");
            poisoned.into_inner()
        })
    }

    /// Rewrite the file from the current buffer, holding the lock for the
    /// whole write.
    fn flush(&self) -> Result<usize, MetricsError> {
        let events = self.lock_events();
        self.store.save(&events)?;
        Ok(events.len())
    }

    /// Flush and report the outcome instead of returning it.
    fn flush_logged(&self) {
        match self.flush() {
            Ok(count) => tracing::debug!(
                "flushed {} metric events to {}",
                count,
                self.store.path().display()
            ),
            Err(e) => tracing::error!("metrics flush failed, keeping events in memory: {}", e),
        }
    }
}

/// Lifecycle of the background flush thread.
enum WorkerState {
    /// Thread is alive and waiting on its timer.
    Running {
        stop_tx: Sender<()>,
        handle: JoinHandle<()>,
    },
    /// Enabled, but the thread could not be spawned.
    NotStarted,
    /// Disabled recorders start here; `stop()` always ends here.
    Stopped,
}

/// Records metric events and persists them to a JSON file.
///
/// `MetricsRecorder` is `Send + Sync`; share it between call sites with
/// an `Arc`. Dropping it performs the same final flush as [`stop`].
///
/// [`stop`]: MetricsRecorder::stop
pub struct MetricsRecorder {
    config: MetricsConfig,
    shared: Arc<Shared>,
    worker: Mutex<WorkerState>,
    /// Set by `stop()`; later events would never reach the disk.
    stopped: AtomicBool,
}

impl MetricsRecorder {
    /// Create a recorder.
    ///
    /// When disabled, nothing is read or written and no thread is started.
    /// When enabled, the existing file (if any) is loaded and migrated,
    /// then the flush thread is started.
    pub fn new(config: MetricsConfig) -> Self {
        let store = EventStore::new(&config.file_path);

        if !config.enabled {
            tracing::debug!("metrics disabled; recorder is a no-op");
            return Self {
                config,
                shared: Arc::new(Shared {
                    store,
                    events: Mutex::new(Vec::new()),
                }),
                worker: Mutex::new(WorkerState::Stopped),
                stopped: AtomicBool::new(false),
            };
        }

        let events = load_existing(&store);
        let shared = Arc::new(Shared {
            store,
            events: Mutex::new(events),
        });

        let interval = config.flush_interval();
        let worker = spawn_worker(Arc::clone(&shared), interval);
        tracing::info!(
            "metrics recorder started: file={}, flush_interval={:?}",
            config.file_path.display(),
            interval
        );

        Self {
            config,
            shared,
            worker: Mutex::new(worker),
            stopped: AtomicBool::new(false),
        }
    }

    /// Append one event. The user id is anonymized before it is stored.
    ///
    /// Never touches the disk; the event is written on the next flush.
    /// Once the recorder is stopped, events are discarded.
    pub fn log_event(&self, raw_user_id: &str, kind: EventKind, details: Option<Details>) {
        if !self.config.enabled {
            return;
        }
        if self.stopped.load(Ordering::Acquire) {
            tracing::debug!("metrics recorder stopped; dropping {} event", kind.as_str());
            return;
        }
        let event = MetricEvent::new(raw_user_id, kind, details);
        self.shared.lock_events().push(event);
    }

    pub fn log_request(&self, user_id: &str) {
        self.log_event(user_id, EventKind::Request, None);
    }

    pub fn log_follow(&self, user_id: &str) {
        self.log_event(user_id, EventKind::Follow, None);
    }

    /// Log a successful alt-text generation.
    ///
    /// Adds `powerConsumptionKWh` when power reporting is enabled and the
    /// active provider runs locally.
    pub fn log_successful_generation(
        &self,
        user_id: &str,
        media_type: &str,
        response_time_ms: i64,
        lang: &str,
    ) {
        if !self.config.enabled {
            return;
        }
        let mut details = Details::new();
        details.insert("mediaType".into(), Value::from(media_type));
        details.insert("responseTime".into(), Value::from(response_time_ms));
        details.insert("lang".into(), Value::from(lang));

        if self.config.reports_power() {
            let kwh = power_consumption_kwh(response_time_ms, self.config.power_metrics.gpu_watts);
            details.insert("powerConsumptionKWh".into(), Value::from(kwh));
        }

        self.log_event(user_id, EventKind::SuccessfulGeneration, Some(details));
    }

    pub fn log_rate_limit_hit(&self, user_id: &str) {
        self.log_event(user_id, EventKind::RateLimitHit, None);
    }

    pub fn log_new_account_activity(&self, user_id: &str) {
        self.log_event(user_id, EventKind::NewAccountActivity, None);
    }

    pub fn log_shadow_ban(&self, user_id: &str) {
        self.log_event(user_id, EventKind::ShadowBan, None);
    }

    pub fn log_un_ban(&self, user_id: &str) {
        self.log_event(user_id, EventKind::UnBan, None);
    }

    pub fn log_weekly_summary(&self, user_id: &str) {
        self.log_event(user_id, EventKind::WeeklySummary, None);
    }

    pub fn log_missing_alt_text(&self, user_id: &str) {
        self.log_event(user_id, EventKind::MissingAltText, None);
    }

    pub fn log_alt_text_reminder_sent(&self, user_id: &str) {
        self.log_event(user_id, EventKind::AltTextReminderSent, None);
    }

    /// Log the user's answer to a consent prompt.
    pub fn log_consent_request(&self, user_id: &str, granted: bool) {
        let mut details = Details::new();
        details.insert("granted".into(), Value::Bool(granted));
        self.log_event(user_id, EventKind::ConsentRequest, Some(details));
    }

    /// Write the buffer to disk now, outside the regular schedule.
    ///
    /// On failure the buffer is left as it was, so a later flush retries.
    pub fn flush(&self) -> Result<(), MetricsError> {
        if !self.config.enabled {
            return Ok(());
        }
        self.shared.flush().map(|_| ())
    }

    /// Stop the flush thread after one final flush.
    ///
    /// Blocks until that flush has finished. Calling it again is a no-op.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let state = {
            let mut worker = self
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *worker, WorkerState::Stopped)
        };

        match state {
            WorkerState::Running { stop_tx, handle } => {
                // A send error means the thread already exited; joining
                // still reaps it.
                let _ = stop_tx.send(());
                if handle.join().is_err() {
                    tracing::error!("metrics flush thread panicked");
                }
                tracing::info!("metrics recorder stopped");
            }
            WorkerState::NotStarted => {
                self.shared.flush_logged();
                tracing::info!("metrics recorder stopped");
            }
            WorkerState::Stopped => {}
        }
    }

    /// Copy of the buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<MetricEvent> {
        self.shared.lock_events().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock_events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// True while the background flush thread is active.
    pub fn is_running(&self) -> bool {
        matches!(
            *self.worker.lock().unwrap_or_else(PoisonError::into_inner),
            WorkerState::Running { .. }
        )
    }

    pub fn file_path(&self) -> &std::path::Path {
        self.shared.store.path()
    }
}

impl Drop for MetricsRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("enabled", &self.config.enabled)
            .field("file_path", &self.config.file_path)
            .field("events", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn_worker(shared: Arc<Shared>, interval: Duration) -> WorkerState {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let spawned = thread::Builder::new()
        .name("metrics-flush".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => shared.flush_logged(),
                // Stop requested, or the recorder went away without asking.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    shared.flush_logged();
                    break;
                }
            }
        });

    match spawned {
        Ok(handle) => WorkerState::Running { stop_tx, handle },
        Err(e) => {
            tracing::error!(
                "failed to start metrics flush thread; events will only be written on stop: {}",
                e
            );
            WorkerState::NotStarted
        }
    }
}

/// Load the existing file and migrate any raw user ids it still holds.
///
/// Unreadable or corrupt files are reported and the recorder starts
/// empty; the file itself is left alone until the next flush.
fn load_existing(store: &EventStore) -> Vec<MetricEvent> {
    let events = match store.load() {
        Ok(Some(events)) => events,
        Ok(None) => {
            tracing::debug!("no metrics file at {}; starting empty", store.path().display());
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("ignoring unreadable metrics file: {}", e);
            return Vec::new();
        }
    };
    tracing::info!("loaded {} metric events from {}", events.len(), store.path().display());

    let (events, migrated) = migrate_user_ids(events);
    if migrated > 0 {
        tracing::info!("anonymized {} stored user ids", migrated);
        if let Err(e) = store.save(&events) {
            tracing::error!("failed to persist migrated metrics, will retry on next flush: {}", e);
        }
    }
    events
}

/// Replace raw user ids with digests. Returns the events and how many
/// ids were rewritten; zero means the input was already fully anonymized.
pub(crate) fn migrate_user_ids(events: Vec<MetricEvent>) -> (Vec<MetricEvent>, usize) {
    if events.iter().all(|e| hasher::is_anonymized(&e.user_id)) {
        return (events, 0);
    }

    let mut migrated = 0;
    let events: Vec<MetricEvent> = events
        .into_iter()
        .map(|mut event| {
            let id = hasher::anonymize_stored(&event.user_id);
            if id != event.user_id {
                event.user_id = id;
                migrated += 1;
            }
            event
        })
        .collect();
    (events, migrated)
}
