//! Session: the conversation state machine.
//!
//! A [`Session`] is a cheap handle onto shared state plus a pump task. The
//! pump is the only writer of events: it consumes backend frames and tool
//! outcomes one at a time, stamps each event with the next sequence number,
//! applies the state transition, and publishes to the session's
//! [`EventBus`]. Callers interact through the handle:
//!
//! ```text
//! Created ──send──▶ Active ──idle──▶ Idle ──send──▶ Active ...
//!                     │
//!                     └──error──▶ Error ──send──▶ Active ...
//! (any) ──destroy──▶ Destroyed
//! ```

mod dispatcher;
mod pump;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kite_core::events::{EventKind, SessionEvent, error_event};
use kite_core::ids::SessionId;
use kite_core::messages::MessageEntry;
use kite_tools::{KiteTool, ToolRegistry};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument};

use crate::connection::{Connection, OutboundRequest};
use crate::errors::RuntimeError;
use crate::event_bus::{EventBus, SubscriptionHandle};
use crate::types::{PendingToolCall, SendOptions, SessionOptions, SessionState};

use dispatcher::ToolDispatcher;

/// Input to the session pump.
pub(crate) enum SessionInput {
    /// Event from the backend.
    Frame(EventKind),
    /// Begin destroy; acknowledged once the session is `Destroyed`.
    Close(oneshot::Sender<()>),
}

/// How a turn ended, as seen by `send_and_wait` and `wait_for_idle`.
#[derive(Clone, Debug)]
pub(crate) enum TurnOutcome {
    Completed { reply: Option<String> },
    Failed { error_type: String, message: String },
    Aborted,
}

/// Called once with the session ID when the session reaches `Destroyed`.
pub(crate) type DestroyHook = Box<dyn Fn(&SessionId) + Send + Sync>;

/// State mutated by both the caller-facing handle and the pump.
struct SessionShared {
    state: SessionState,
    closing: bool,
    registry: ToolRegistry,
    tools_dirty: bool,
    dispatcher: ToolDispatcher,
    messages: Vec<MessageEntry>,
    turn: u64,
    reply: Option<String>,
    /// Callers waiting on the running turn. Only ever holds waiters for
    /// `turn`; drained when it ends.
    waiters: Vec<oneshot::Sender<TurnOutcome>>,
}

impl SessionShared {
    fn end_turn(&mut self, outcome: &TurnOutcome) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }
}

struct SessionInner {
    id: SessionId,
    model: String,
    streaming: bool,
    options: SessionOptions,
    connection: Arc<dyn Connection>,
    bus: EventBus,
    shared: Mutex<SessionShared>,
    on_destroyed: DestroyHook,
}

/// Handle to one managed conversation.
///
/// The pump only holds [`SessionInner`]; the input sender lives on the
/// handles, so dropping every handle shuts the pump down.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    input: mpsc::UnboundedSender<SessionInput>,
}

impl Session {
    /// Create the session and start its pump. Must be called within a Tokio
    /// runtime.
    pub(crate) fn spawn(
        id: SessionId,
        model: String,
        streaming: bool,
        registry: ToolRegistry,
        options: SessionOptions,
        connection: Arc<dyn Connection>,
        on_destroyed: DestroyHook,
    ) -> Self {
        let (input, inputs) = mpsc::unbounded_channel();
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            bus: EventBus::new(id.clone()),
            shared: Mutex::new(SessionShared {
                state: SessionState::Created,
                closing: false,
                registry,
                tools_dirty: false,
                dispatcher: ToolDispatcher::new(id.clone(), options.tool_timeout, outcome_tx),
                messages: Vec::new(),
                turn: 0,
                reply: None,
                waiters: Vec::new(),
            }),
            id,
            model,
            streaming,
            options,
            connection,
            on_destroyed,
        });
        let _pump = tokio::spawn(pump::run(inner.clone(), inputs, outcomes));
        Self { inner, input }
    }

    // ─── Introspection ──────────────────────────────────────────────────

    /// Session ID.
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Model the session was created with.
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Whether the backend streams deltas for this session.
    pub fn streaming(&self) -> bool {
        self.inner.streaming
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.shared.lock().state
    }

    /// Snapshot of the append-only message log.
    pub fn messages(&self) -> Vec<MessageEntry> {
        self.inner.shared.lock().messages.clone()
    }

    /// Registered tool names, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.inner.shared.lock().registry.names()
    }

    /// Tool calls whose completion has not been delivered yet.
    pub fn pending_tool_calls(&self) -> Vec<PendingToolCall> {
        self.inner.shared.lock().dispatcher.pending()
    }

    /// Subscriber callbacks that panicked so far.
    pub fn failed_deliveries(&self) -> u64 {
        self.inner.bus.failed_deliveries()
    }

    // ─── Subscriptions ──────────────────────────────────────────────────

    /// Receive this session's events from now on, in sequence order.
    ///
    /// The callback runs on a dedicated task, never on the caller's. After
    /// destroy the returned handle is inert.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(Arc::new(callback))
    }

    /// Stop a subscription. Returns `false` for an unknown handle.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.bus.unsubscribe(handle)
    }

    // ─── Tools ──────────────────────────────────────────────────────────

    /// Add a tool before the first turn.
    ///
    /// The registry is sealed once the session leaves `Created`; later
    /// registrations fail with `InvalidState`. Tools added here are announced
    /// with the first `send`.
    pub fn register_tool(&self, tool: Arc<dyn KiteTool>) -> Result<(), RuntimeError> {
        let mut shared = self.inner.shared.lock();
        if shared.closing || shared.state != SessionState::Created {
            return Err(RuntimeError::InvalidState {
                session_id: self.inner.id.clone(),
                state: shared.state,
                operation: "register_tool",
            });
        }
        shared.registry.register(tool)?;
        shared.tools_dirty = true;
        Ok(())
    }

    // ─── Turns ──────────────────────────────────────────────────────────

    /// Start a turn and return immediately; observe the reply through
    /// subscriptions.
    pub async fn send(&self, prompt: impl Into<String>) -> Result<(), RuntimeError> {
        self.send_with_options(prompt, SendOptions::default()).await
    }

    /// [`Session::send`] with per-call overrides.
    pub async fn send_with_options(
        &self,
        prompt: impl Into<String>,
        options: SendOptions,
    ) -> Result<(), RuntimeError> {
        let _ = self.begin_turn(prompt.into(), options.model).await?;
        Ok(())
    }

    /// Start a turn and wait for it to end.
    ///
    /// Returns the turn's last assistant message (`None` if the turn produced
    /// none). A turn ending in `session.error` fails with `TurnFailed`.
    pub async fn send_and_wait(
        &self,
        prompt: impl Into<String>,
    ) -> Result<Option<String>, RuntimeError> {
        self.send_and_wait_with_options(prompt, SendOptions::default())
            .await
    }

    /// [`Session::send_and_wait`] with per-call overrides.
    pub async fn send_and_wait_with_options(
        &self,
        prompt: impl Into<String>,
        options: SendOptions,
    ) -> Result<Option<String>, RuntimeError> {
        let timeout = options.timeout.unwrap_or(self.inner.options.send_timeout);
        let waiter = self.begin_turn(prompt.into(), options.model).await?;
        match await_turn(waiter, timeout).await? {
            TurnOutcome::Completed { reply } => Ok(reply),
            TurnOutcome::Failed {
                error_type,
                message,
            } => Err(RuntimeError::TurnFailed {
                error_type,
                message,
            }),
            TurnOutcome::Aborted => Err(self.aborted("send_and_wait")),
        }
    }

    /// Wait for the running turn (if any) to end and return the state it left
    /// the session in. Bounded by the session's send timeout.
    pub async fn wait_for_idle(&self) -> Result<SessionState, RuntimeError> {
        let waiter = {
            let mut shared = self.inner.shared.lock();
            if shared.state != SessionState::Active {
                return Ok(shared.state);
            }
            let (tx, rx) = oneshot::channel();
            shared.waiters.push(tx);
            rx
        };
        Ok(match await_turn(waiter, self.inner.options.send_timeout).await? {
            TurnOutcome::Completed { .. } => SessionState::Idle,
            TurnOutcome::Failed { .. } => SessionState::Error,
            TurnOutcome::Aborted => SessionState::Destroyed,
        })
    }

    fn aborted(&self, operation: &'static str) -> RuntimeError {
        RuntimeError::InvalidState {
            session_id: self.inner.id.clone(),
            state: SessionState::Destroyed,
            operation,
        }
    }

    #[instrument(skip_all, fields(session_id = %self.inner.id))]
    async fn begin_turn(
        &self,
        prompt: String,
        model: Option<String>,
    ) -> Result<oneshot::Receiver<TurnOutcome>, RuntimeError> {
        let (request, turn, waiter) = {
            let mut shared = self.inner.shared.lock();
            if shared.closing || shared.state == SessionState::Destroyed {
                return Err(RuntimeError::InvalidState {
                    session_id: self.inner.id.clone(),
                    state: shared.state,
                    operation: "send",
                });
            }
            if shared.state == SessionState::Active {
                return Err(RuntimeError::SessionBusy(self.inner.id.clone()));
            }

            shared.state = SessionState::Active;
            shared.turn += 1;
            shared.reply = None;
            shared.messages.push(MessageEntry::user(prompt.clone()));
            let tools = if shared.tools_dirty {
                shared.tools_dirty = false;
                Some(shared.registry.definitions())
            } else {
                None
            };
            // Registered before the request goes out, so an outcome that
            // arrives while `send` is still in flight is not missed.
            let (tx, waiter) = oneshot::channel();
            shared.waiters.push(tx);
            let request = OutboundRequest::Send {
                session_id: self.inner.id.clone(),
                prompt,
                model,
                tools,
            };
            (request, shared.turn, waiter)
        };

        debug!(turn, "turn started");
        if let Err(e) = self.inner.connection.send(request).await {
            error!(error = %e, "send failed");
            self.deliver(error_event("connection", e.to_string()));
        }
        Ok(waiter)
    }

    // ─── Teardown ───────────────────────────────────────────────────────

    /// Destroy the session.
    ///
    /// Pending tool calls get up to the drain timeout to finish; the rest are
    /// cancelled and reported as abandoned. Every event is delivered to
    /// subscribers before the state becomes `Destroyed`, and none after.
    /// Calling this again is a no-op.
    #[instrument(skip_all, fields(session_id = %self.inner.id))]
    pub async fn destroy(&self) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state == SessionState::Destroyed {
                return;
            }
            shared.closing = true;
        }
        let (ack, done) = oneshot::channel();
        if self.input.send(SessionInput::Close(ack)).is_ok() {
            let _ = done.await;
        }
        debug!("session destroyed");
    }

    // ─── Client plumbing ────────────────────────────────────────────────

    /// Queue a backend event for the pump.
    pub(crate) fn deliver(&self, event: EventKind) {
        let _ = self.input.send(SessionInput::Frame(event));
    }

    /// Fail the running turn after the transport went away.
    pub(crate) fn connection_lost(&self) {
        if self.state() == SessionState::Active {
            self.deliver(error_event("connection", "backend connection lost"));
        }
    }
}

/// Wait for the outcome of the turn `waiter` was registered on. A dropped
/// sender means the pump stopped without ending the turn.
async fn await_turn(
    waiter: oneshot::Receiver<TurnOutcome>,
    timeout: Duration,
) -> Result<TurnOutcome, RuntimeError> {
    match tokio::time::timeout(timeout, waiter).await {
        Err(_) => Err(RuntimeError::WaitTimeout {
            waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
        Ok(outcome) => Ok(outcome.unwrap_or(TurnOutcome::Aborted)),
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("model", &self.inner.model)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
