//! Progress reporting seam (ambient "logging" stack — see SPEC_FULL.md).
//! Modeled on the teacher's `ProgressHook`/`ProgressEvent` channel pattern
//! (`vizier-core/src/agent.rs`) rather than a logging crate: callers pass a
//! `&dyn ProgressSink` and receive structured events as a `SyncOps` call or
//! the watch loop makes progress.

#[derive(Debug, Clone)]
pub enum SyncEvent {
    Scanning,
    Fetching(String),
    Uploading(String),
    Deleting(String),
    Warning(String),
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: SyncEvent);
}

/// A sink that discards every event, for callers that don't care.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: SyncEvent) {}
}

/// A sink that records every event, used by tests to assert on the shape
/// of a run without capturing stdout.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_event(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}
