//! Test helpers shared across Duet crates.

pub mod events;
pub mod provider;
pub mod runtime;
pub mod store;

pub use events::RecordingSink;
pub use provider::{RecordedCall, ScriptedProvider};
pub use runtime::ScriptedLocalRuntime;
pub use store::FailingBlobStore;
