//! Scripted backends and an event recorder shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use kite_core::events::{
    EventKind, SessionEvent, ToolCallResult, delta_event, message_event, tool_start_event,
};
use kite_core::ids::{MessageId, SessionId};
use kite_runtime::{
    Client, ClientOptions, InboundFrame, LoopbackConnection, OutboundRequest, Session,
    SessionConfig,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

pub fn frame(session_id: &SessionId, event: EventKind) -> InboundFrame {
    InboundFrame::new(session_id.clone(), event)
}

/// Word-sized chunks that concatenate back to `text`.
pub fn chunks(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_owned).collect()
}

/// Deltas for each chunk, the full message, then idle.
pub fn reply_frames(session_id: &SessionId, parts: &[String]) -> Vec<InboundFrame> {
    let message_id = MessageId::new();
    let mut frames: Vec<InboundFrame> = parts
        .iter()
        .map(|part| frame(session_id, delta_event(message_id.clone(), part.clone())))
        .collect();
    frames.push(frame(session_id, message_event(message_id, parts.concat())));
    frames.push(frame(session_id, EventKind::SessionIdle));
    frames
}

/// Backend answering every prompt with `reply(prompt)`, streamed word by word.
pub fn echo_backend<F>(reply: F) -> Arc<LoopbackConnection>
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    Arc::new(LoopbackConnection::new(move |req| match req {
        OutboundRequest::Send {
            session_id, prompt, ..
        } => reply_frames(session_id, &chunks(&reply(prompt))),
        _ => Vec::new(),
    }))
}

/// Backend that requests each `(call_id, tool, arguments)` on send and
/// answers once every result has come back, quoting them in call order.
/// With no calls it answers the prompt directly.
pub fn tool_backend(calls: Vec<(&'static str, &'static str, Value)>) -> Arc<LoopbackConnection> {
    let expected = calls.len();
    let results: Arc<Mutex<Vec<(String, ToolCallResult)>>> = Arc::new(Mutex::new(Vec::new()));
    let order: Vec<String> = calls.iter().map(|(id, _, _)| (*id).to_owned()).collect();

    Arc::new(LoopbackConnection::new(move |req| match req {
        OutboundRequest::Send { session_id, .. } => {
            if calls.is_empty() {
                return reply_frames(session_id, &["No tools needed.".to_owned()]);
            }
            results.lock().clear();
            calls
                .iter()
                .map(|(id, name, args)| frame(session_id, tool_start_event(*id, *name, args.clone())))
                .collect()
        }
        OutboundRequest::ToolResult {
            session_id,
            tool_call_id,
            result,
        } => {
            let mut got = results.lock();
            got.push((tool_call_id.to_string(), result.clone()));
            if got.len() < expected {
                return Vec::new();
            }
            let text = order
                .iter()
                .filter_map(|id| got.iter().find(|(gid, _)| gid == id))
                .map(|(_, r)| r.log_text())
                .collect::<Vec<_>>()
                .join("\n");
            reply_frames(session_id, &[format!("Tool said: {text}")])
        }
        _ => Vec::new(),
    }))
}

/// Started client plus one session over `conn`.
pub async fn open_session(conn: Arc<LoopbackConnection>, config: SessionConfig) -> (Client, Session) {
    let client = Client::new(conn, ClientOptions::default());
    client.start().await.unwrap();
    let session = client.create_session(config).await.unwrap();
    (client, session)
}

/// Subscriber that keeps every event and lets the test await them.
pub struct Recorder {
    events: Arc<Mutex<Vec<SessionEvent>>>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Recorder {
    pub fn attach(session: &Session) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = events.clone();
        let _ = session.subscribe(move |e: &SessionEvent| {
            sink.lock().push(e.clone());
            let _ = tx.send(e.clone());
        });
        Self { events, rx }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SessionEvent::event_type).collect()
    }

    /// Receive until the next idle or error event (inclusive).
    pub async fn until_turn_end(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.rx.recv().await {
            let end = event.kind.is_turn_end();
            out.push(event);
            if end {
                break;
            }
        }
        out
    }

    /// Receive the next event.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }
}
