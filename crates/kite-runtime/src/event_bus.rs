//! Per-session ordered fan-out of events to subscriber callbacks.
//!
//! Every subscriber owns an unbounded FIFO queue drained by its own delivery
//! task, so `publish` never waits on a callback and each subscriber sees the
//! session's events in publish order. A callback that panics is reported
//! through `tracing` and counted; delivery to it and to every other
//! subscriber continues.
//!
//! Late subscribers receive events from the point of subscription onward.
//! History is not replayed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kite_core::events::SessionEvent;
use kite_core::ids::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Subscriber callback.
pub type EventCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    handle: SubscriptionHandle,
    tx: mpsc::UnboundedSender<SessionEvent>,
    task: JoinHandle<()>,
}

/// Ordered event fan-out for one session.
pub struct EventBus {
    session_id: SessionId,
    subscribers: Mutex<Vec<Subscriber>>,
    retired: Mutex<Vec<JoinHandle<()>>>,
    next_handle: AtomicU64,
    publish_count: AtomicU64,
    failed_deliveries: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl EventBus {
    /// Bus for `session_id`.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            subscribers: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            publish_count: AtomicU64::new(0),
            failed_deliveries: Arc::new(AtomicU64::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a callback. Must be called within a Tokio runtime.
    ///
    /// Subscribing to a closed bus returns a handle that never fires.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if self.closed.load(Ordering::Acquire) {
            debug!(session_id = %self.session_id, "subscribe on closed bus ignored");
            return handle;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(deliver(
            self.session_id.clone(),
            rx,
            callback,
            self.failed_deliveries.clone(),
        ));
        self.subscribers.lock().push(Subscriber { handle, tx, task });
        handle
    }

    /// Remove a subscriber. Events already queued for it are still delivered.
    ///
    /// Returns `false` if the handle is unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.subscribers.lock();
        let Some(pos) = subs.iter().position(|s| s.handle == handle) else {
            return false;
        };
        let sub = subs.remove(pos);
        self.retired.lock().push(sub.task);
        true
    }

    /// Queue `event` for every current subscriber. Never blocks.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: &SessionEvent) -> usize {
        if self.closed.load(Ordering::Acquire) {
            debug!(
                session_id = %self.session_id,
                seq = event.seq,
                "publish on closed bus dropped"
            );
            return 0;
        }
        let _ = self.publish_count.fetch_add(1, Ordering::Relaxed);
        let subs = self.subscribers.lock();
        subs.iter()
            .filter(|s| s.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Stop accepting events, then wait until every subscriber has drained
    /// its queue.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let subs = std::mem::take(&mut *self.subscribers.lock());
        let mut tasks = std::mem::take(&mut *self.retired.lock());
        tasks.extend(subs.into_iter().map(|s| s.task));
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Number of events published so far.
    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Relaxed)
    }

    /// Number of callback invocations that panicked.
    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }
}

async fn deliver(
    session_id: SessionId,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
    callback: EventCallback,
    failed: Arc<AtomicU64>,
) {
    while let Some(event) = rx.recv().await {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
        if let Err(panic) = outcome {
            let _ = failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                session_id = %session_id,
                seq = event.seq,
                event_type = event.event_type(),
                panic = %panic_message(panic.as_ref()),
                "subscriber callback panicked"
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_owned()
}
