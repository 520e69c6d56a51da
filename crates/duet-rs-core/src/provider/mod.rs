//! Generation backends behind one streaming contract.
//!
//! Both the remote and the local backend yield pure text deltas; the local
//! adapter normalizes its runtime's cumulative snapshots before they leave
//! this module.

mod delta;
pub mod local;
pub mod ollama;
pub mod remote;
mod sse;

pub use delta::DeltaNormalizer;
pub use local::{LocalBackend, LocalModelSession, LocalRuntime, LocalRuntimeError, SnapshotStream};
pub use ollama::OllamaRuntime;
pub use remote::RemoteBackend;

use crate::error::GenerationError;
use crate::types::{BackendKind, Message};
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

/// Finite, non-restartable sequence of response text deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Raw HTTP body chunks with transport errors flattened to text.
pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

/// Whether a backend can currently serve requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Usable right away.
    Ready,
    /// Usable, but the model must be fetched first so the first turn is slow.
    AfterDownload,
    Unavailable,
}

impl Availability {
    pub fn is_usable(&self) -> bool {
        !matches!(self, Availability::Unavailable)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Ready => f.write_str("ready"),
            Availability::AfterDownload => f.write_str("after-download"),
            Availability::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A text-generation backend the orchestrator can route turns to.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether required configuration was present at construction time.
    fn is_configured(&self) -> bool {
        true
    }

    /// Query current availability. Never fails; faults map to `Unavailable`.
    async fn probe(&self) -> Availability;

    /// Start streaming a response to `prompt` given the prior transcript.
    ///
    /// Precondition failures are returned before any I/O happens.
    async fn stream(&self, history: &[Message], prompt: &str)
    -> Result<DeltaStream, GenerationError>;
}
