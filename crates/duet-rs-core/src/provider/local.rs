//! On-device backend adapter.
//!
//! Wraps a [`LocalRuntime`], flattens the transcript into one prompt, and
//! normalizes the runtime's cumulative output into deltas. The runtime
//! session is destroyed on every exit path, including when the caller drops
//! the stream early.

use super::{Availability, DeltaNormalizer, DeltaStream, GenerationProvider};
use crate::error::GenerationError;
use crate::types::{BackendKind, Message, Role};
use async_trait::async_trait;
use duet_rs_config::LocalConfig;
use futures_util::{Stream, StreamExt, stream};
use log::{debug, info, warn};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Cumulative text snapshots produced by a local model session.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String, LocalRuntimeError>> + Send>>;

/// Failures reported by a local model runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalRuntimeError {
    /// The platform has no local model runtime at all.
    #[error("local runtime unsupported: {0}")]
    Unsupported(String),
    #[error("local runtime failure: {0}")]
    Failed(String),
}

/// Platform facility that hosts an on-device model.
#[async_trait]
pub trait LocalRuntime: Send + Sync {
    async fn availability(&self) -> Result<Availability, LocalRuntimeError>;

    /// Open a fresh model session seeded with a system prompt.
    async fn create_session(
        &self,
        system_prompt: &str,
    ) -> Result<Box<dyn LocalModelSession>, LocalRuntimeError>;
}

/// One scoped model session.
pub trait LocalModelSession: Send {
    /// Stream the text generated so far, one cumulative snapshot per item.
    fn prompt_streaming(&mut self, prompt: &str) -> SnapshotStream;

    /// Release the session. Must not panic.
    fn destroy(&mut self);
}

const UNSUPPORTED_MESSAGE: &str = "This device does not provide an on-device model runtime.";
const UNAVAILABLE_MESSAGE: &str = "The on-device model is not available on this device.";

/// Local backend adapter.
pub struct LocalBackend {
    runtime: Arc<dyn LocalRuntime>,
    system_prompt: String,
    preamble: String,
}

impl LocalBackend {
    pub fn new(runtime: Arc<dyn LocalRuntime>, config: &LocalConfig) -> Self {
        Self {
            runtime,
            system_prompt: config.system_prompt.clone(),
            preamble: config.preamble.clone(),
        }
    }
}

#[async_trait]
impl GenerationProvider for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn probe(&self) -> Availability {
        match self.runtime.availability().await {
            Ok(availability) => availability,
            Err(err) => {
                debug!("local availability query failed (error={err})");
                Availability::Unavailable
            }
        }
    }

    async fn stream(
        &self,
        history: &[Message],
        prompt: &str,
    ) -> Result<DeltaStream, GenerationError> {
        match self.runtime.availability().await {
            Ok(Availability::Unavailable) => {
                return Err(GenerationError::LocalUnavailable(
                    UNAVAILABLE_MESSAGE.to_string(),
                ));
            }
            Ok(availability) => {
                if availability == Availability::AfterDownload {
                    warn!("local model not downloaded yet; first response may be slow");
                }
            }
            Err(LocalRuntimeError::Unsupported(reason)) => {
                debug!("local runtime unsupported (reason={reason})");
                return Err(GenerationError::LocalUnavailable(
                    UNSUPPORTED_MESSAGE.to_string(),
                ));
            }
            Err(err) => {
                debug!("local availability query failed (error={err})");
                return Err(GenerationError::LocalUnavailable(
                    UNAVAILABLE_MESSAGE.to_string(),
                ));
            }
        }

        let full_prompt = build_local_prompt(&self.preamble, history, prompt);
        let mut session = self
            .runtime
            .create_session(&self.system_prompt)
            .await
            .map_err(|err| GenerationError::local_generation(err.to_string()))?;
        info!(
            "opened local model session (history_len={}, prompt_len={})",
            history.len(),
            full_prompt.len()
        );
        let snapshots = session.prompt_streaming(&full_prompt);
        Ok(normalized_stream(SessionGuard::new(session), snapshots))
    }
}

/// Flatten the transcript into the single prompt the local model receives.
pub fn build_local_prompt(preamble: &str, history: &[Message], prompt: &str) -> String {
    let context = history
        .iter()
        .filter(|message| !message.is_error)
        .map(|message| {
            let speaker = if message.role == Role::User {
                "User"
            } else {
                "Assistant"
            };
            format!("{speaker}: {}", message.content())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut sections = vec![format!("System: {preamble}")];
    if !context.is_empty() {
        sections.push(format!("Context:\n{context}"));
    }
    sections.push(format!("User: {prompt}"));
    sections.push("Assistant:".to_string());
    sections.join("\n\n")
}

/// Owns a model session and destroys it exactly once.
struct SessionGuard {
    session: Option<Box<dyn LocalModelSession>>,
}

impl SessionGuard {
    fn new(session: Box<dyn LocalModelSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.destroy();
            debug!("destroyed local model session");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

struct LocalStreamState {
    guard: SessionGuard,
    snapshots: SnapshotStream,
    normalizer: DeltaNormalizer,
    finished: bool,
}

fn normalized_stream(guard: SessionGuard, snapshots: SnapshotStream) -> DeltaStream {
    let state = LocalStreamState {
        guard,
        snapshots,
        normalizer: DeltaNormalizer::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.snapshots.next().await {
                Some(Ok(snapshot)) => {
                    if let Some(delta) = state.normalizer.push(&snapshot) {
                        return Some((Ok(delta), state));
                    }
                }
                Some(Err(err)) => {
                    warn!("local generation failed (error={err})");
                    state.guard.release();
                    state.finished = true;
                    return Some((Err(GenerationError::local_generation(err.to_string())), state));
                }
                None => {
                    debug!(
                        "local stream finished (response_len={})",
                        state.normalizer.text().len()
                    );
                    state.guard.release();
                    return None;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::build_local_prompt;
    use crate::types::Message;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[test]
    fn prompt_without_history_has_no_context_block() {
        let prompt = build_local_prompt("Be brief.", &[], "Hello?");
        assert_eq!(prompt, "System: Be brief.\n\nUser: Hello?\n\nAssistant:");
    }

    #[test]
    fn prompt_renders_history_and_skips_errors() {
        let history = vec![
            Message::user("hi"),
            Message::model(Uuid::new_v4(), "hello there", 2),
            Message::error("network down"),
        ];
        let prompt = build_local_prompt("Be brief.", &history, "and now?");
        assert_eq!(
            prompt,
            "System: Be brief.\n\nContext:\nUser: hi\n\nAssistant: hello there\n\nUser: and now?\n\nAssistant:"
        );
    }
}
