//! In-memory log capture for tests that assert on runtime diagnostics.
//!
//! Subscriber panics, dropped frames, and abandoned tool calls are reported
//! only through `tracing`, so tests observe them here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded log line.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level the event was emitted at.
    pub level: Level,
    /// Emitting module path.
    pub target: String,
    /// The event's message.
    pub message: String,
    /// Structured fields, rendered as strings.
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Value of the field `key`, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Events captured while a [`capture_logs`] guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Snapshot of everything captured so far.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Whether any event carries `key = value`.
    pub fn has_field(&self, key: &str, value: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.field(key) == Some(value))
    }

    /// Messages of events tagged with `session_id`, in emission order.
    pub fn session_messages(&self, session_id: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.field("session_id") == Some(session_id))
            .map(|e| e.message.clone())
            .collect()
    }

    /// Number of events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }
}

#[derive(Default)]
struct Fields {
    message: String,
    rest: BTreeMap<String, String>,
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            let _ = self.rest.insert(field.name().to_owned(), value.to_owned());
        }
    }
}

struct Recorder(CapturedLogs);

impl<S: Subscriber> Layer<S> for Recorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let meta = event.metadata();
        self.0.events.lock().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_owned(),
            message: fields.message,
            fields: fields.rest,
        });
    }
}

/// Capture every event emitted on the current thread until the guard drops.
///
/// Spawned tasks are only seen on a current-thread runtime (the
/// `#[tokio::test]` default).
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(Recorder(logs.clone()))
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_level_and_message() {
        let (logs, _guard) = capture_logs();
        tracing::warn!("subscriber callback panicked");
        tracing::debug!("noise");
        assert!(logs.has_event(Level::WARN, "callback panicked"));
        assert!(!logs.has_event(Level::ERROR, "callback panicked"));
        assert_eq!(logs.count_at_level(Level::WARN), 1);
    }

    #[test]
    fn numeric_and_display_fields_become_strings() {
        let (logs, _guard) = capture_logs();
        let id = "s1";
        tracing::info!(session_id = %id, seq = 3_u64, ok = true, "event delivered");
        let event = &logs.events()[0];
        assert_eq!(event.message, "event delivered");
        assert_eq!(event.field("session_id"), Some("s1"));
        assert_eq!(event.field("seq"), Some("3"));
        assert!(logs.has_field("ok", "true"));
    }

    #[test]
    fn session_messages_filters_by_session() {
        let (logs, _guard) = capture_logs();
        tracing::debug!(session_id = "a", "turn started");
        tracing::debug!(session_id = "b", "turn started");
        tracing::warn!(session_id = "a", "tool call abandoned");
        assert_eq!(logs.session_messages("a"), vec!["turn started", "tool call abandoned"]);
        assert!(logs.session_messages("c").is_empty());
    }

    #[test]
    fn nothing_captured_after_guard_drops() {
        let (logs, guard) = capture_logs();
        drop(guard);
        tracing::error!("late");
        assert!(logs.events().is_empty());
    }
}
