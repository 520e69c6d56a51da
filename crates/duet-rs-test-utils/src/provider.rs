use async_trait::async_trait;
use duet_rs_core::{
    Availability, BackendKind, DeltaStream, GenerationError, GenerationProvider, Message,
};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// Arguments seen by one `stream` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history: Vec<Message>,
    pub prompt: String,
}

#[derive(Debug, Clone)]
enum Script {
    Deltas(Vec<String>),
    FailAfter(Vec<String>, GenerationError),
    FailOnStart(GenerationError),
    /// Yield the deltas, then never finish.
    Hang(Vec<String>),
}

/// Provider that replays a fixed script of deltas.
#[derive(Clone)]
pub struct ScriptedProvider {
    kind: BackendKind,
    configured: bool,
    availability: Availability,
    script: Script,
    gate: Option<Arc<Notify>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedProvider {
    pub fn new(kind: BackendKind, deltas: &[&str]) -> Self {
        Self {
            kind,
            configured: true,
            availability: Availability::Ready,
            script: Script::Deltas(to_strings(deltas)),
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn cloud(deltas: &[&str]) -> Self {
        Self::new(BackendKind::Cloud, deltas)
    }

    pub fn local(deltas: &[&str]) -> Self {
        Self::new(BackendKind::Local, deltas)
    }

    /// Report a missing credential.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Fail with `error` once the scripted deltas are exhausted.
    pub fn failing_after(mut self, error: GenerationError) -> Self {
        let deltas = self.deltas();
        self.script = Script::FailAfter(deltas, error);
        self
    }

    /// Fail before producing a stream.
    pub fn failing_on_start(mut self, error: GenerationError) -> Self {
        self.script = Script::FailOnStart(error);
        self
    }

    /// Keep the stream open forever after the scripted deltas.
    pub fn hanging(mut self) -> Self {
        let deltas = self.deltas();
        self.script = Script::Hang(deltas);
        self
    }

    /// Hold the first delta until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn deltas(&self) -> Vec<String> {
        match &self.script {
            Script::Deltas(deltas) | Script::FailAfter(deltas, _) | Script::Hang(deltas) => {
                deltas.clone()
            }
            Script::FailOnStart(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn probe(&self) -> Availability {
        self.availability
    }

    async fn stream(
        &self,
        history: &[Message],
        prompt: &str,
    ) -> Result<DeltaStream, GenerationError> {
        self.calls.lock().push(RecordedCall {
            history: history.to_vec(),
            prompt: prompt.to_string(),
        });
        let (deltas, tail): (Vec<String>, BoxStream<'static, Result<String, GenerationError>>) =
            match &self.script {
                Script::FailOnStart(error) => return Err(error.clone()),
                Script::Deltas(deltas) => (deltas.clone(), stream::empty().boxed()),
                Script::FailAfter(deltas, error) => {
                    (deltas.clone(), stream::iter(vec![Err(error.clone())]).boxed())
                }
                Script::Hang(deltas) => (deltas.clone(), stream::pending().boxed()),
            };
        let gate = self.gate.clone();
        let wait = stream::once(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
        })
        .filter_map(|_| async { None::<Result<String, GenerationError>> });
        let body = stream::iter(deltas.into_iter().map(Ok));
        Ok(Box::pin(wait.chain(body).chain(tail)))
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
