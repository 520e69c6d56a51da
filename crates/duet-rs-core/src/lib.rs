//! Core chat primitives for Duet.
//!
//! This crate owns the session data model, the session store, the two
//! generation backends, backend selection, and the turn orchestrator that
//! streams a response into durable session state.

pub mod connectivity;
pub mod error;
pub mod events;
pub mod mode;
pub mod orchestrator;
pub mod probe;
pub mod provider;
pub mod store;
pub mod types;

pub use connectivity::Connectivity;
pub use duet_rs_config::ConnectionMode;
pub use error::{DuetCoreError, GenerationError};
pub use events::{ChatEvent, EventMsg, EventSink};
pub use mode::{generating_label, mode_label, resolve_backend};
pub use orchestrator::{ChatController, ChatControllerBuilder, RejectReason, TurnOutcome};
pub use probe::CapabilityProbe;
pub use provider::{Availability, DeltaStream, GenerationProvider};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore, SessionStore, StoreError};
pub use types::{BackendKind, ChatSession, Message, MessageBody, MessageId, Role, SessionId};
