//! Chat controller: session selection, backend routing and turn execution.

mod turn;

pub use turn::{RejectReason, TurnOutcome};

use crate::connectivity::Connectivity;
use crate::error::DuetCoreError;
use crate::events::{ChatEvent, EventMsg, EventSink};
use crate::mode::{generating_label, mode_label};
use crate::probe::CapabilityProbe;
use crate::provider::{Availability, GenerationProvider, LocalBackend, OllamaRuntime, RemoteBackend};
use crate::store::SessionStore;
use crate::types::{BackendKind, ChatSession, SessionId, now_millis, sort_by_recency};
use duet_rs_config::{ConnectionMode, DuetConfig};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Renderer-facing state. The store owns the durable copy.
struct ViewState {
    sessions: Vec<ChatSession>,
    active: Option<SessionId>,
    mode: ConnectionMode,
    /// Backend serving the in-flight turn, if any.
    streaming_backend: Option<BackendKind>,
}

impl ViewState {
    fn session_mut(&mut self, session_id: SessionId) -> Option<&mut ChatSession> {
        self.sessions
            .iter_mut()
            .find(|session| session.id == session_id)
    }

    /// Re-sort by recency and put `session_id` first.
    fn promote(&mut self, session_id: SessionId) {
        sort_by_recency(&mut self.sessions);
        if let Some(pos) = self
            .sessions
            .iter()
            .position(|session| session.id == session_id)
        {
            let session = self.sessions.remove(pos);
            self.sessions.insert(0, session);
        }
    }
}

/// Builder for [`ChatController`].
pub struct ChatControllerBuilder {
    store: Arc<SessionStore>,
    remote: Arc<dyn GenerationProvider>,
    local: Arc<dyn GenerationProvider>,
    mode: ConnectionMode,
    connectivity: Connectivity,
    idle_timeout: Option<Duration>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl ChatControllerBuilder {
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Fail a turn when no delta arrives within `timeout`.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn build(self) -> ChatController {
        ChatController {
            probe: CapabilityProbe::new(self.local.clone()),
            store: self.store,
            remote: self.remote,
            local: self.local,
            connectivity: self.connectivity,
            view: RwLock::new(ViewState {
                sessions: Vec::new(),
                active: None,
                mode: self.mode,
                streaming_backend: None,
            }),
            generating: AtomicBool::new(false),
            idle_timeout: self.idle_timeout,
            event_sink: self.event_sink,
        }
    }
}

/// Owns the session view and runs one turn at a time.
pub struct ChatController {
    store: Arc<SessionStore>,
    remote: Arc<dyn GenerationProvider>,
    local: Arc<dyn GenerationProvider>,
    probe: CapabilityProbe,
    connectivity: Connectivity,
    view: RwLock<ViewState>,
    generating: AtomicBool,
    idle_timeout: Option<Duration>,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl ChatController {
    pub fn builder(
        store: Arc<SessionStore>,
        remote: Arc<dyn GenerationProvider>,
        local: Arc<dyn GenerationProvider>,
    ) -> ChatControllerBuilder {
        ChatControllerBuilder {
            store,
            remote,
            local,
            mode: ConnectionMode::default(),
            connectivity: Connectivity::default(),
            idle_timeout: None,
            event_sink: None,
        }
    }

    /// Wire the shipped backends and the file-backed store from config.
    pub fn from_config(
        config: &DuetConfig,
        connectivity: Connectivity,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, DuetCoreError> {
        let store = Arc::new(SessionStore::open(&config.sessions)?);
        let remote: Arc<dyn GenerationProvider> = Arc::new(RemoteBackend::from_env(&config.remote));
        let runtime = Arc::new(OllamaRuntime::new(&config.local));
        let local: Arc<dyn GenerationProvider> = Arc::new(LocalBackend::new(runtime, &config.local));
        let mut builder = Self::builder(store, remote, local)
            .mode(config.mode)
            .connectivity(connectivity)
            .idle_timeout(
                config
                    .generation
                    .idle_timeout_secs
                    .map(Duration::from_secs),
            );
        if let Some(sink) = event_sink {
            builder = builder.event_sink(sink);
        }
        Ok(builder.build())
    }

    /// Load persisted sessions, activate the most recent one (creating a
    /// fresh session when none exist) and run the startup capability check.
    pub async fn start(&self) {
        let mut sessions = self.store.list_sessions();
        if sessions.is_empty() {
            sessions.push(self.create_session());
        }
        let active = sessions.first().map(|session| session.id);
        info!(
            "chat controller started (sessions={}, mode={})",
            sessions.len(),
            self.mode()
        );
        {
            let mut view = self.view.write();
            view.sessions = sessions;
            view.active = active;
        }
        self.emit(active, ChatEvent::SessionsChanged { active });
        self.refresh_capability().await;
    }

    /// Create an empty session, put it first and activate it.
    pub fn new_chat(&self) -> SessionId {
        let session = self.create_session();
        let session_id = session.id;
        {
            let mut view = self.view.write();
            view.sessions.insert(0, session);
            view.active = Some(session_id);
        }
        self.emit(
            Some(session_id),
            ChatEvent::SessionsChanged {
                active: Some(session_id),
            },
        );
        session_id
    }

    pub fn select_session(&self, session_id: SessionId) -> Result<(), DuetCoreError> {
        {
            let mut view = self.view.write();
            if view.session_mut(session_id).is_none() {
                return Err(DuetCoreError::UnknownSession(session_id));
            }
            view.active = Some(session_id);
        }
        debug!("selected session (session_id={session_id})");
        self.emit(
            Some(session_id),
            ChatEvent::SessionsChanged {
                active: Some(session_id),
            },
        );
        Ok(())
    }

    /// Delete a session. When it was active, the most recently updated
    /// remaining session takes over, or a fresh one when none remain.
    pub fn delete_session(&self, session_id: SessionId) {
        if let Err(err) = self.store.delete_session(session_id) {
            error!("failed to delete session (session_id={session_id}, error={err})");
        }
        let needs_new = {
            let mut view = self.view.write();
            view.sessions.retain(|session| session.id != session_id);
            if view.active == Some(session_id) {
                sort_by_recency(&mut view.sessions);
                view.active = view.sessions.first().map(|session| session.id);
            }
            view.active.is_none()
        };
        if needs_new {
            self.new_chat();
            return;
        }
        let active = self.active_session_id();
        self.emit(active, ChatEvent::SessionsChanged { active });
    }

    pub fn rename_session(&self, session_id: SessionId, title: &str) -> Result<(), DuetCoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DuetCoreError::InvalidInput(
                "session title must not be empty".to_string(),
            ));
        }
        {
            let mut view = self.view.write();
            let Some(session) = view.session_mut(session_id) else {
                return Err(DuetCoreError::UnknownSession(session_id));
            };
            session.title = title.to_string();
        }
        if let Err(err) = self.store.rename_session(session_id, title) {
            error!("failed to rename session (session_id={session_id}, error={err})");
        }
        let active = self.active_session_id();
        self.emit(Some(session_id), ChatEvent::SessionsChanged { active });
        Ok(())
    }

    pub fn set_mode(&self, mode: ConnectionMode) {
        self.view.write().mode = mode;
        info!("connection mode changed (mode={mode})");
    }

    pub fn mode(&self) -> ConnectionMode {
        self.view.read().mode
    }

    /// Feed a connectivity transition from the host.
    pub fn set_online(&self, online: bool) {
        if self.connectivity.set_online(online) {
            let active = self.active_session_id();
            self.emit(active, ChatEvent::ConnectivityChanged { online });
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Re-query the local backend and cache the result.
    pub async fn refresh_capability(&self) -> bool {
        let previous = self.probe.status();
        let usable = self.probe.check_availability().await;
        if let Some(availability) = self.probe.status()
            && previous != Some(availability)
        {
            let active = self.active_session_id();
            self.emit(active, ChatEvent::CapabilityChanged { availability });
        }
        usable
    }

    /// Last known local availability; `None` before the first check.
    pub fn capability(&self) -> Option<Availability> {
        self.probe.status()
    }

    pub fn remote_configured(&self) -> bool {
        self.remote.is_configured()
    }

    pub fn active_mode_label(&self) -> &'static str {
        mode_label(self.mode(), self.is_online())
    }

    /// Status line shown while a turn streams.
    pub fn generating_label(&self) -> Option<&'static str> {
        self.view.read().streaming_backend.map(generating_label)
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.view.read().active
    }

    pub fn active_session(&self) -> Option<ChatSession> {
        let view = self.view.read();
        let active = view.active?;
        view.sessions
            .iter()
            .find(|session| session.id == active)
            .cloned()
    }

    /// Sessions in display order, most recently updated first.
    pub fn sessions(&self) -> Vec<ChatSession> {
        self.view.read().sessions.clone()
    }

    fn create_session(&self) -> ChatSession {
        match self.store.create_session() {
            Ok(session) => session,
            Err(err) => {
                warn!("failed to persist new session; keeping it in memory (error={err})");
                ChatSession::new(now_millis())
            }
        }
    }

    fn persist(&self, session: &ChatSession) {
        if let Err(err) = self.store.save_session(session) {
            error!(
                "failed to persist session (session_id={}, error={err})",
                session.id
            );
        }
    }

    fn emit(&self, session_id: Option<SessionId>, payload: ChatEvent) {
        if let Some(sink) = &self.event_sink {
            sink.emit(EventMsg::new(session_id, payload));
        }
    }
}
