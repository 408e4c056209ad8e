//! The session pump: single writer of a session's event stream.

use std::sync::Arc;

use kite_core::events::{EventKind, SessionEvent, ToolCallResult, ToolFailureKind};
use kite_core::ids::ToolCallId;
use kite_core::messages::MessageEntry;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::dispatcher::{Dispatch, ToolOutcome};
use super::{SessionInner, SessionInput, TurnOutcome};
use crate::connection::OutboundRequest;
use crate::types::SessionState;

struct Pump {
    inner: Arc<SessionInner>,
    seq: u64,
}

/// Drive the session until it is destroyed or every handle is dropped.
pub(super) async fn run(
    inner: Arc<SessionInner>,
    mut inputs: mpsc::UnboundedReceiver<SessionInput>,
    mut outcomes: mpsc::UnboundedReceiver<ToolOutcome>,
) {
    let mut pump = Pump { inner, seq: 0 };
    let mut acks = Vec::new();

    loop {
        tokio::select! {
            input = inputs.recv() => match input {
                Some(SessionInput::Frame(event)) => pump.on_frame(event).await,
                Some(SessionInput::Close(ack)) => {
                    acks.push(ack);
                    break;
                }
                None => {
                    debug!(session_id = %pump.inner.id, "all session handles dropped");
                    break;
                }
            },
            Some(outcome) = outcomes.recv() => pump.on_outcome(outcome).await,
        }
    }

    pump.shutdown(&mut inputs, &mut outcomes, &mut acks).await;
    while let Ok(input) = inputs.try_recv() {
        if let SessionInput::Close(ack) = input {
            acks.push(ack);
        }
    }
    for ack in acks {
        let _ = ack.send(());
    }
}

impl Pump {
    fn stamp(&mut self, kind: EventKind) -> SessionEvent {
        self.seq += 1;
        SessionEvent::new(self.inner.id.clone(), self.seq, kind)
    }

    fn publish(&mut self, kind: EventKind) {
        let event = self.stamp(kind);
        let _ = self.inner.bus.publish(&event);
    }

    async fn on_frame(&mut self, event: EventKind) {
        debug!(session_id = %self.inner.id, event_type = event.event_type(), "frame received");
        match event {
            EventKind::ToolExecutionStart {
                tool_call_id,
                tool_name,
                arguments,
            } => self.on_tool_start(tool_call_id, tool_name, arguments).await,
            EventKind::ToolExecutionComplete { tool_call_id, .. } => {
                warn!(
                    session_id = %self.inner.id,
                    %tool_call_id,
                    "backend-sent tool completion ignored"
                );
            }
            EventKind::AssistantMessage {
                message_id,
                content,
            } => {
                let event = self.stamp(EventKind::AssistantMessage {
                    message_id,
                    content: content.clone(),
                });
                let mut shared = self.inner.shared.lock();
                shared.messages.push(MessageEntry::assistant(content.clone()));
                if shared.state == SessionState::Active {
                    shared.reply = Some(content);
                }
                let _ = self.inner.bus.publish(&event);
            }
            EventKind::AssistantMessageDelta { .. } => self.publish(event),
            EventKind::SessionIdle => {
                let event = self.stamp(EventKind::SessionIdle);
                let mut shared = self.inner.shared.lock();
                let ended = shared.state == SessionState::Active;
                if ended {
                    shared.state = SessionState::Idle;
                }
                let _ = self.inner.bus.publish(&event);
                if ended {
                    let reply = shared.reply.take();
                    shared.end_turn(&TurnOutcome::Completed { reply });
                }
            }
            EventKind::SessionError {
                error_type,
                message,
            } => self.fail_turn(error_type, message),
        }
    }

    fn fail_turn(&mut self, error_type: String, message: String) {
        let event = self.stamp(EventKind::SessionError {
            error_type: error_type.clone(),
            message: message.clone(),
        });
        let mut shared = self.inner.shared.lock();
        let ended = shared.state == SessionState::Active;
        if ended {
            shared.state = SessionState::Error;
            shared.reply = None;
        }
        let _ = self.inner.bus.publish(&event);
        if ended {
            shared.end_turn(&TurnOutcome::Failed {
                error_type,
                message,
            });
        }
    }

    async fn on_tool_start(
        &mut self,
        tool_call_id: ToolCallId,
        tool_name: String,
        arguments: serde_json::Value,
    ) {
        let dispatch = {
            let mut shared = self.inner.shared.lock();
            let tool = shared.registry.get(&tool_name);
            shared
                .dispatcher
                .dispatch(&tool_call_id, &tool_name, &arguments, tool)
        };
        match dispatch {
            Dispatch::Duplicate => {}
            Dispatch::Spawned => self.publish(EventKind::ToolExecutionStart {
                tool_call_id,
                tool_name,
                arguments,
            }),
            Dispatch::Rejected(result) => {
                self.publish(EventKind::ToolExecutionStart {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    arguments,
                });
                self.finish_tool(tool_call_id, tool_name, result, true).await;
            }
        }
    }

    async fn on_outcome(&mut self, outcome: ToolOutcome) {
        if !self
            .inner
            .shared
            .lock()
            .dispatcher
            .complete(&outcome.tool_call_id)
        {
            debug!(
                session_id = %self.inner.id,
                tool_call_id = %outcome.tool_call_id,
                "outcome for retired tool call dropped"
            );
            return;
        }
        self.finish_tool(outcome.tool_call_id, outcome.tool_name, outcome.result, true)
            .await;
    }

    /// Log, publish the completion event, and (optionally) hand the result
    /// back to the backend as continuation input.
    async fn finish_tool(
        &mut self,
        tool_call_id: ToolCallId,
        tool_name: String,
        result: ToolCallResult,
        forward: bool,
    ) {
        debug!(
            session_id = %self.inner.id,
            %tool_call_id,
            tool_name,
            success = result.is_success(),
            "tool call finished"
        );
        self.inner
            .shared
            .lock()
            .messages
            .push(MessageEntry::tool(tool_call_id.clone(), result.log_text()));
        self.publish(EventKind::ToolExecutionComplete {
            tool_call_id: tool_call_id.clone(),
            tool_name,
            result: result.clone(),
        });

        if !forward {
            return;
        }
        let request = OutboundRequest::ToolResult {
            session_id: self.inner.id.clone(),
            tool_call_id,
            result,
        };
        if let Err(e) = self.inner.connection.send(request).await {
            error!(session_id = %self.inner.id, error = %e, "tool result not delivered");
            self.fail_turn("connection".into(), e.to_string());
        }
    }

    async fn shutdown(
        &mut self,
        inputs: &mut mpsc::UnboundedReceiver<SessionInput>,
        outcomes: &mut mpsc::UnboundedReceiver<ToolOutcome>,
        acks: &mut Vec<oneshot::Sender<()>>,
    ) {
        let deadline = tokio::time::Instant::now() + self.inner.options.tool_drain_timeout;
        while !self.inner.shared.lock().dispatcher.is_idle() {
            tokio::select! {
                Some(outcome) = outcomes.recv() => self.on_outcome(outcome).await,
                Some(input) = inputs.recv() => match input {
                    SessionInput::Frame(event) => debug!(
                        session_id = %self.inner.id,
                        event_type = event.event_type(),
                        "frame ignored while closing"
                    ),
                    SessionInput::Close(ack) => acks.push(ack),
                },
                () = tokio::time::sleep_until(deadline) => break,
            }
        }

        let abandoned = self.inner.shared.lock().dispatcher.abandon_all();
        for call in abandoned {
            warn!(
                session_id = %self.inner.id,
                tool_call_id = %call.tool_call_id,
                tool_name = call.tool_name,
                "tool call abandoned"
            );
            let result = ToolCallResult::failure(
                ToolFailureKind::Abandoned,
                "session destroyed before the tool finished",
            );
            self.finish_tool(call.tool_call_id, call.tool_name, result, false)
                .await;
        }

        self.inner.shared.lock().end_turn(&TurnOutcome::Aborted);

        self.inner.bus.close().await;
        (self.inner.on_destroyed)(&self.inner.id);
        self.inner.shared.lock().state = SessionState::Destroyed;

        let request = OutboundRequest::Destroy {
            session_id: self.inner.id.clone(),
        };
        if let Err(e) = self.inner.connection.send(request).await {
            warn!(session_id = %self.inner.id, error = %e, "destroy request not delivered");
        }
        debug!(session_id = %self.inner.id, events = self.seq, "session pump stopped");
    }
}
