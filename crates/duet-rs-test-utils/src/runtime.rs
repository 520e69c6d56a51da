use async_trait::async_trait;
use duet_rs_core::Availability;
use duet_rs_core::provider::{LocalModelSession, LocalRuntime, LocalRuntimeError, SnapshotStream};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Local runtime that replays cumulative snapshots and counts sessions.
///
/// Clones share counters, so a test can keep one handle and give another to
/// the backend under test.
#[derive(Clone)]
pub struct ScriptedLocalRuntime {
    availability: Result<Availability, LocalRuntimeError>,
    snapshots: Vec<String>,
    fail_on_create: Option<LocalRuntimeError>,
    fail_after: Option<LocalRuntimeError>,
    hang: bool,
    created: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
    system_prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLocalRuntime {
    pub fn new(snapshots: &[&str]) -> Self {
        Self {
            availability: Ok(Availability::Ready),
            snapshots: snapshots.iter().map(|value| value.to_string()).collect(),
            fail_on_create: None,
            fail_after: None,
            hang: false,
            created: Arc::new(AtomicUsize::new(0)),
            destroyed: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            system_prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = Ok(availability);
        self
    }

    pub fn with_availability_error(mut self, error: LocalRuntimeError) -> Self {
        self.availability = Err(error);
        self
    }

    pub fn failing_on_create(mut self, error: LocalRuntimeError) -> Self {
        self.fail_on_create = Some(error);
        self
    }

    /// Fail after the scripted snapshots are streamed.
    pub fn failing_after(mut self, error: LocalRuntimeError) -> Self {
        self.fail_after = Some(error);
        self
    }

    /// Keep the snapshot stream open after the scripted snapshots.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().clone()
    }
}

#[async_trait]
impl LocalRuntime for ScriptedLocalRuntime {
    async fn availability(&self) -> Result<Availability, LocalRuntimeError> {
        self.availability.clone()
    }

    async fn create_session(
        &self,
        system_prompt: &str,
    ) -> Result<Box<dyn LocalModelSession>, LocalRuntimeError> {
        if let Some(error) = &self.fail_on_create {
            return Err(error.clone());
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.system_prompts.lock().push(system_prompt.to_string());
        Ok(Box::new(ScriptedSession {
            runtime: self.clone(),
        }))
    }
}

struct ScriptedSession {
    runtime: ScriptedLocalRuntime,
}

impl LocalModelSession for ScriptedSession {
    fn prompt_streaming(&mut self, prompt: &str) -> SnapshotStream {
        self.runtime.prompts.lock().push(prompt.to_string());
        let snapshots = stream::iter(self.runtime.snapshots.clone().into_iter().map(Ok));
        let tail: BoxStream<'static, Result<String, LocalRuntimeError>> = match (
            &self.runtime.fail_after,
            self.runtime.hang,
        ) {
            (Some(error), _) => stream::iter(vec![Err(error.clone())]).boxed(),
            (None, true) => stream::pending().boxed(),
            (None, false) => stream::empty().boxed(),
        };
        Box::pin(snapshots.chain(tail))
    }

    fn destroy(&mut self) {
        self.runtime.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
