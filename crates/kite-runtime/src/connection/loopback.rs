//! In-process connection driven by a responder closure.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Connection, ConnectionError, InboundFrame, OutboundRequest};

type Responder = dyn Fn(&OutboundRequest) -> Vec<InboundFrame> + Send + Sync;

/// A connection whose "backend" is a closure.
///
/// Every outbound request is recorded and handed to the responder; the frames
/// it returns are queued on the inbound stream in order. Frames can also be
/// pushed directly with [`LoopbackConnection::inject`].
pub struct LoopbackConnection {
    responder: Box<Responder>,
    inbound: Mutex<Option<mpsc::UnboundedSender<InboundFrame>>>,
    sent: Mutex<Vec<OutboundRequest>>,
}

impl LoopbackConnection {
    /// Connection scripted by `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OutboundRequest) -> Vec<InboundFrame> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            inbound: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Connection that never answers on its own.
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Push a frame onto the inbound stream.
    pub fn inject(&self, frame: InboundFrame) -> Result<(), ConnectionError> {
        let guard = self.inbound.lock();
        let tx = guard.as_ref().ok_or(ConnectionError::NotOpen)?;
        tx.send(frame).map_err(|_| ConnectionError::Closed)
    }

    /// End the inbound stream without going through `close`, as a dropped
    /// transport would.
    pub fn disconnect(&self) {
        let _ = self.inbound.lock().take();
    }

    /// Every request sent so far, in order.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().clone()
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.inbound.lock().is_some()
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    async fn open(&self) -> Result<mpsc::UnboundedReceiver<InboundFrame>, ConnectionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock() = Some(tx);
        debug!("loopback connection opened");
        Ok(rx)
    }

    async fn send(&self, request: OutboundRequest) -> Result<(), ConnectionError> {
        let tx = self.inbound.lock().clone().ok_or(ConnectionError::NotOpen)?;
        self.sent.lock().push(request.clone());
        for frame in (self.responder)(&request) {
            tx.send(frame).map_err(|_| ConnectionError::Closed)?;
        }
        Ok(())
    }

    async fn close(&self) {
        if self.inbound.lock().take().is_some() {
            debug!("loopback connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use kite_core::events::{EventKind, message_event};

    fn destroy(id: &str) -> OutboundRequest {
        OutboundRequest::Destroy {
            session_id: id.into(),
        }
    }

    #[tokio::test]
    async fn send_before_open_fails() {
        let conn = LoopbackConnection::silent();
        let err = conn.send(destroy("s1")).await.unwrap_err();
        assert_matches!(err, ConnectionError::NotOpen);
        assert!(conn.sent().is_empty());
    }

    #[tokio::test]
    async fn responder_frames_arrive_in_order() {
        let conn = LoopbackConnection::new(|req| {
            vec![
                InboundFrame::new(req.session_id().clone(), message_event("m1", "one")),
                InboundFrame::new(req.session_id().clone(), EventKind::SessionIdle),
            ]
        });
        let mut rx = conn.open().await.unwrap();
        conn.send(destroy("s1")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event, message_event("m1", "one"));
        assert_eq!(rx.recv().await.unwrap().event, EventKind::SessionIdle);
        assert_eq!(conn.sent(), vec![destroy("s1")]);
    }

    #[tokio::test]
    async fn inject_and_close_end_the_stream() {
        let conn = LoopbackConnection::silent();
        let mut rx = conn.open().await.unwrap();
        conn.inject(InboundFrame::new("s1".into(), EventKind::SessionIdle))
            .unwrap();
        conn.close().await;
        assert!(!conn.is_open());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
        assert_matches!(
            conn.inject(InboundFrame::new("s1".into(), EventKind::SessionIdle)),
            Err(ConnectionError::NotOpen)
        );
    }

    #[tokio::test]
    async fn reopen_after_close() {
        let conn = LoopbackConnection::silent();
        let _ = conn.open().await.unwrap();
        conn.close().await;
        let _rx = conn.open().await.unwrap();
        assert!(conn.is_open());
        conn.send(destroy("s1")).await.unwrap();
    }
}
