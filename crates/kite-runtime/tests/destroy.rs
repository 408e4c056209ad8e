//! Destroy semantics with tool calls still in flight.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{Recorder, frame, open_session, tool_backend};
use kite_core::events::{EventKind, ToolCallResult, ToolFailureKind, delta_event};
use kite_core::logging::capture_logs;
use kite_core::tools::ToolParameterSchema;
use kite_runtime::{
    Client, ClientOptions, OutboundRequest, RuntimeError, SessionConfig, SessionOptions,
    SessionState, ToolCallState,
};
use kite_tools::{FnTool, KiteTool};
use parking_lot::Mutex;
use serde_json::json;

fn options(drain: Duration) -> ClientOptions {
    ClientOptions {
        session: SessionOptions {
            tool_drain_timeout: drain,
            ..SessionOptions::default()
        },
        ..ClientOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn pending_call_finishing_within_drain_completes_normally() {
    let slow: Arc<dyn KiteTool> = Arc::new(FnTool::new(
        "slow_listing",
        "Takes a moment",
        ToolParameterSchema::object(),
        |_, _| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok("Files in .:\nCargo.toml".to_owned())
        },
    ));
    let conn = tool_backend(vec![("c1", "slow_listing", json!({}))]);
    let client = Client::new(conn.clone(), options(Duration::from_secs(5)));
    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::new().tool(slow)).await.unwrap();
    let mut recorder = Recorder::attach(&session);

    session.send("list").await.unwrap();
    let started = recorder.next().await.unwrap();
    assert_eq!(started.event_type(), "tool.execution_start");
    assert_eq!(session.pending_tool_calls()[0].state, ToolCallState::Running);

    session.destroy().await;

    let events = recorder.events();
    let last = events.last().unwrap();
    assert_matches!(
        &last.kind,
        EventKind::ToolExecutionComplete { result, .. }
            if *result == ToolCallResult::success("Files in .:\nCargo.toml")
    );
    assert_eq!(session.state(), SessionState::Destroyed);
    assert!(session.pending_tool_calls().is_empty());
    client.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stuck_call_is_abandoned_and_cancelled() {
    let (logs, _guard) = capture_logs();
    let token = Arc::new(Mutex::new(None));
    let slot = token.clone();
    let stuck: Arc<dyn KiteTool> = Arc::new(FnTool::new(
        "stuck",
        "Waits until cancelled",
        ToolParameterSchema::object(),
        move |_, ctx| {
            *slot.lock() = Some(ctx.cancellation.clone());
            async move {
                ctx.cancellation.cancelled().await;
                Ok("too late".to_owned())
            }
        },
    ));
    let conn = tool_backend(vec![("c1", "stuck", json!({}))]);
    let client = Client::new(conn.clone(), options(Duration::from_millis(250)));
    client.start().await.unwrap();
    let session = client.create_session(SessionConfig::new().tool(stuck)).await.unwrap();
    let mut recorder = Recorder::attach(&session);

    session.send("hang").await.unwrap();
    let _ = recorder.next().await.unwrap();
    session.destroy().await;

    let events = recorder.events();
    let completions: Vec<&ToolCallResult> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ToolExecutionComplete { result, .. } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].failure_kind(), Some(ToolFailureKind::Abandoned));
    assert!(session.pending_tool_calls().is_empty());

    let token = token.lock().clone();
    assert!(token.is_some_and(|t| t.is_cancelled()));
    assert!(
        logs.session_messages(session.id().as_str())
            .contains(&"tool call abandoned".to_owned())
    );

    let forwarded = conn
        .sent()
        .iter()
        .filter(|r| matches!(r, OutboundRequest::ToolResult { .. }))
        .count();
    assert_eq!(forwarded, 0);
    assert_eq!(conn.sent().last().map(OutboundRequest::method), Some("session.destroy"));
    client.stop().await;
}

#[tokio::test]
async fn nothing_is_delivered_after_destroy() {
    let conn = Arc::new(kite_runtime::LoopbackConnection::silent());
    let (client, session) = open_session(conn.clone(), SessionConfig::new()).await;
    let recorder = Recorder::attach(&session);

    session.send("hi").await.unwrap();
    conn.inject(frame(session.id(), delta_event("m1", "par"))).unwrap();
    session.destroy().await;
    let delivered = recorder.events().len();

    conn.inject(frame(session.id(), delta_event("m1", "tial"))).unwrap();
    conn.inject(frame(session.id(), EventKind::SessionIdle)).unwrap();
    let late = Recorder::attach(&session);
    tokio::task::yield_now().await;

    assert_eq!(recorder.events().len(), delivered);
    assert!(late.events().is_empty());
    assert_eq!(session.state(), SessionState::Destroyed);
    client.stop().await;
}

#[tokio::test]
async fn destroy_releases_a_waiting_caller() {
    let conn = Arc::new(kite_runtime::LoopbackConnection::silent());
    let (client, session) = open_session(conn, SessionConfig::new()).await;

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.send_and_wait("never answered").await })
    };
    while session.state() != SessionState::Active {
        tokio::task::yield_now().await;
    }
    session.destroy().await;

    let result = waiter.await.unwrap();
    assert_matches!(
        result,
        Err(RuntimeError::InvalidState { state: SessionState::Destroyed, .. })
    );
    client.stop().await;
}
