//! Client: owner of one connection and the sessions created over it.

use std::sync::Arc;

use dashmap::DashMap;
use kite_core::ids::SessionId;
use kite_settings::KiteSettings;
use kite_tools::ToolRegistry;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::connection::{Connection, InboundFrame, OutboundRequest};
use crate::errors::RuntimeError;
use crate::session::Session;
use crate::types::{ClientOptions, ClientState, SessionConfig};

/// Process-level owner of a backend connection.
///
/// Lifecycle operations (`start`, `create_session`, `stop`) are serialized.
/// `stop` destroys every live session before the connection is released, so
/// no session outlives it. A session leaves the client's map as soon as it is
/// destroyed. Dropping a started client without `stop` stops routing and
/// releases its sessions, whose pumps then wind down on their own.
pub struct Client {
    connection: Arc<dyn Connection>,
    options: ClientOptions,
    lifecycle: tokio::sync::Mutex<()>,
    state: Arc<RwLock<ClientState>>,
    sessions: Arc<DashMap<SessionId, Session>>,
    router: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Client over `connection`. Nothing is opened until [`Client::start`].
    pub fn new(connection: Arc<dyn Connection>, options: ClientOptions) -> Self {
        Self {
            connection,
            options,
            lifecycle: tokio::sync::Mutex::new(()),
            state: Arc::new(RwLock::new(ClientState::Uninitialized)),
            sessions: Arc::new(DashMap::new()),
            router: parking_lot::Mutex::new(None),
        }
    }

    /// Client configured from loaded settings.
    pub fn with_settings(connection: Arc<dyn Connection>, settings: &KiteSettings) -> Self {
        Self::new(connection, ClientOptions::from_settings(settings))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Client-wide defaults.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// IDs of sessions that have not been destroyed.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Look up a live session. Destroyed sessions are not found.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Session, RuntimeError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.clone()))
    }

    /// Open the connection and begin routing frames.
    ///
    /// Fails with `AlreadyStarted` if the client is running. A stopped client
    /// may be started again.
    #[instrument(skip_all)]
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let _guard = self.lifecycle.lock().await;
        if self.state() == ClientState::Started {
            return Err(RuntimeError::AlreadyStarted);
        }

        let inbound = self.connection.open().await?;
        let router = tokio::spawn(route_frames(
            inbound,
            self.sessions.clone(),
            self.state.clone(),
        ));
        *self.router.lock() = Some(router);
        *self.state.write() = ClientState::Started;
        debug!("client started");
        Ok(())
    }

    /// Create a session and register it with the backend.
    #[instrument(skip_all, fields(session_id))]
    pub async fn create_session(&self, config: SessionConfig) -> Result<Session, RuntimeError> {
        let _guard = self.lifecycle.lock().await;
        if self.state() != ClientState::Started {
            return Err(RuntimeError::ClientNotStarted);
        }

        let registry = ToolRegistry::from_tools(config.tools)?;
        let session_id = SessionId::new();
        let _ = tracing::Span::current().record("session_id", session_id.as_str());
        let model = config
            .model
            .unwrap_or_else(|| self.options.default_model.clone());
        let streaming = config.streaming.unwrap_or(self.options.streaming);
        let request = OutboundRequest::CreateSession {
            session_id: session_id.clone(),
            model: model.clone(),
            streaming,
            tools: registry.definitions(),
        };

        let owner = Arc::downgrade(&self.sessions);
        let session = Session::spawn(
            session_id.clone(),
            model,
            streaming,
            registry,
            self.options.session,
            self.connection.clone(),
            Box::new(move |id| {
                if let Some(sessions) = owner.upgrade() {
                    let _ = sessions.remove(id);
                }
            }),
        );
        let _ = self.sessions.insert(session_id.clone(), session.clone());

        if let Err(e) = self.connection.send(request).await {
            error!(error = %e, "create-session request failed");
            let _ = self.sessions.remove(&session_id);
            session.destroy().await;
            return Err(e.into());
        }
        debug!(model = session.model(), "session created");
        Ok(session)
    }

    /// Destroy every session, then release the connection.
    ///
    /// Stopping a client that is not started is a no-op.
    #[instrument(skip_all)]
    pub async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.state() != ClientState::Started {
            return;
        }

        let sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in &sessions {
            session.destroy().await;
        }
        self.sessions.clear();

        *self.state.write() = ClientState::Stopped;
        self.connection.close().await;
        let router = self.router.lock().take();
        if let Some(router) = router {
            let _ = router.await;
        }
        debug!(destroyed = sessions.len(), "client stopped");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(router) = self.router.get_mut().take() {
            router.abort();
        }
        self.sessions.clear();
    }
}

/// Forward inbound frames to their sessions until the stream ends.
async fn route_frames(
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
    sessions: Arc<DashMap<SessionId, Session>>,
    state: Arc<RwLock<ClientState>>,
) {
    while let Some(InboundFrame { session_id, event }) = inbound.recv().await {
        match sessions.get(&session_id) {
            Some(session) => session.deliver(event),
            None => warn!(
                %session_id,
                event_type = event.event_type(),
                "frame for unknown session dropped"
            ),
        }
    }

    if *state.read() == ClientState::Started {
        error!("backend connection lost");
        for entry in sessions.iter() {
            entry.value().connection_lost();
        }
    }
}
