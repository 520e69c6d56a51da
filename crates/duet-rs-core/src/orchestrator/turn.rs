use super::ChatController;
use crate::error::GenerationError;
use crate::events::{ChatEvent, TurnId};
use crate::mode::resolve_backend;
use crate::provider::GenerationProvider;
use crate::types::{BackendKind, ChatSession, Message, MessageId, SessionId, now_millis};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use uuid::Uuid;

const MISSING_KEY_MESSAGE: &str = "Gemini API key is missing. Check your environment variables.";
const LOCAL_REQUIRED_MESSAGE: &str = "Local mode requires an on-device model, which is not available. Connect to the internet to use Cloud mode.";

/// Why a turn was refused before anything changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    NoActiveSession,
    /// Another turn is still streaming.
    Busy,
}

/// Result of [`ChatController::send_message`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Rejected(RejectReason),
    Committed {
        turn_id: TurnId,
        message_id: MessageId,
        backend: BackendKind,
        content: String,
    },
    /// An error message was appended to the session.
    Failed {
        turn_id: TurnId,
        backend: BackendKind,
        error: GenerationError,
    },
}

/// Holds the single-turn slot; releasing it clears the generating state.
struct GeneratingGuard<'a> {
    controller: &'a ChatController,
}

impl<'a> GeneratingGuard<'a> {
    fn acquire(controller: &'a ChatController) -> Option<Self> {
        controller
            .generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self { controller })
    }
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.controller.view.write().streaming_backend = None;
        self.controller.generating.store(false, Ordering::SeqCst);
    }
}

impl ChatController {
    /// Run one turn on the active session.
    ///
    /// The user message is persisted before generation starts, so it survives
    /// any later failure. Generation errors never propagate: they become an
    /// error message in the session.
    pub async fn send_message(&self, input: &str) -> TurnOutcome {
        let content = input.trim();
        if content.is_empty() {
            return TurnOutcome::Rejected(RejectReason::EmptyInput);
        }
        let Some(session_id) = self.active_session_id() else {
            return TurnOutcome::Rejected(RejectReason::NoActiveSession);
        };
        let Some(_generating) = GeneratingGuard::acquire(self) else {
            debug!("turn rejected while generating (session_id={session_id})");
            return TurnOutcome::Rejected(RejectReason::Busy);
        };

        let Some((history, snapshot)) = self.append_user_message(session_id, content) else {
            return TurnOutcome::Rejected(RejectReason::NoActiveSession);
        };
        self.persist(&snapshot);
        self.emit(
            Some(session_id),
            ChatEvent::SessionsChanged {
                active: Some(session_id),
            },
        );

        let turn_id = Uuid::new_v4();
        let backend = resolve_backend(self.mode(), self.is_online(), self.probe.snapshot());
        self.view.write().streaming_backend = Some(backend);
        info!(
            "turn started (turn_id={turn_id}, session_id={session_id}, backend={backend}, history_len={})",
            history.len()
        );
        self.emit(Some(session_id), ChatEvent::TurnStarted { turn_id, backend });

        let response_id = Uuid::new_v4();
        let result = match self.check_backend(backend).await {
            Ok(provider) => {
                self.stream_response(provider, session_id, turn_id, response_id, &history, content)
                    .await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(text) => {
                self.commit(session_id, turn_id, response_id, &text);
                TurnOutcome::Committed {
                    turn_id,
                    message_id: response_id,
                    backend,
                    content: text,
                }
            }
            Err(error) => {
                self.fail(session_id, turn_id, response_id, &error);
                TurnOutcome::Failed {
                    turn_id,
                    backend,
                    error,
                }
            }
        }
    }

    /// Append the user message to the view copy.
    ///
    /// Returns the transcript before the message and the updated session.
    fn append_user_message(
        &self,
        session_id: SessionId,
        content: &str,
    ) -> Option<(Vec<Message>, ChatSession)> {
        let mut view = self.view.write();
        let session = view.session_mut(session_id)?;
        let history = session.messages.clone();
        session.push_user_message(Message::user(content));
        let snapshot = session.clone();
        view.promote(session_id);
        Some((history, snapshot))
    }

    async fn check_backend(
        &self,
        backend: BackendKind,
    ) -> Result<&dyn GenerationProvider, GenerationError> {
        match backend {
            BackendKind::Cloud => {
                if !self.remote.is_configured() {
                    return Err(GenerationError::Configuration(
                        MISSING_KEY_MESSAGE.to_string(),
                    ));
                }
                Ok(self.remote.as_ref())
            }
            BackendKind::Local => {
                if !self.probe.snapshot() && !self.refresh_capability().await {
                    return Err(GenerationError::LocalUnavailable(
                        LOCAL_REQUIRED_MESSAGE.to_string(),
                    ));
                }
                Ok(self.local.as_ref())
            }
        }
    }

    async fn stream_response(
        &self,
        provider: &dyn GenerationProvider,
        session_id: SessionId,
        turn_id: TurnId,
        response_id: MessageId,
        history: &[Message],
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let mut deltas = provider.stream(history, prompt).await?;
        let mut text = String::new();
        loop {
            let next = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, deltas.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("turn stalled (turn_id={turn_id}, idle_secs={})", limit.as_secs());
                        return Err(GenerationError::Stalled(limit.as_secs()));
                    }
                },
                None => deltas.next().await,
            };
            let delta = match next {
                Some(Ok(delta)) => delta,
                Some(Err(err)) => return Err(err),
                None => break,
            };
            if delta.is_empty() {
                continue;
            }
            text.push_str(&delta);
            if let Some(session) = self.view.write().session_mut(session_id) {
                session.apply_delta(response_id, &delta, now_millis());
            }
            debug!(
                "received delta (turn_id={turn_id}, delta_len={}, total_len={})",
                delta.len(),
                text.len()
            );
            self.emit(
                Some(session_id),
                ChatEvent::MessageDelta {
                    turn_id,
                    message_id: response_id,
                    delta,
                },
            );
        }
        Ok(text)
    }

    /// Find-or-append the final response on the stored session and persist it.
    fn commit(&self, session_id: SessionId, turn_id: TurnId, response_id: MessageId, text: &str) {
        let final_message = {
            let mut view = self.view.write();
            let committed = view.session_mut(session_id).and_then(|session| {
                if !session.finalize_message(response_id) {
                    session.push_message(Message::model(response_id, text, now_millis()));
                }
                session.message(response_id).cloned()
            });
            view.promote(session_id);
            committed
        };
        let final_message =
            final_message.unwrap_or_else(|| Message::model(response_id, text, now_millis()));

        // Another writer may have changed the record while streaming.
        match self.store.get_session(session_id) {
            Some(mut stored) => {
                stored.upsert_message(final_message);
                self.persist(&stored);
            }
            None => warn!(
                "dropping response for session missing from store (session_id={session_id}, turn_id={turn_id})"
            ),
        }
        info!(
            "turn committed (turn_id={turn_id}, session_id={session_id}, response_len={})",
            text.len()
        );
        self.emit(
            Some(session_id),
            ChatEvent::TurnCommitted {
                turn_id,
                message_id: response_id,
                content: text.to_string(),
            },
        );
    }

    /// Keep any partial response and append a visible error message.
    fn fail(
        &self,
        session_id: SessionId,
        turn_id: TurnId,
        response_id: MessageId,
        error: &GenerationError,
    ) {
        warn!("turn failed (turn_id={turn_id}, session_id={session_id}, error={error})");
        let snapshot = {
            let mut view = self.view.write();
            let snapshot = view.session_mut(session_id).map(|session| {
                session.finalize_message(response_id);
                session.push_message(Message::error(error));
                session.clone()
            });
            view.promote(session_id);
            snapshot
        };
        if let Some(session) = snapshot {
            self.persist(&session);
        }
        self.emit(
            Some(session_id),
            ChatEvent::TurnFailed {
                turn_id,
                message: error.to_string(),
            },
        );
    }
}
