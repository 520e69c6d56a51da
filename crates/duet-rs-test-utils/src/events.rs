use duet_rs_core::{ChatEvent, EventMsg, EventSink};
use parking_lot::Mutex;

/// Event sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EventMsg>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventMsg> {
        self.events.lock().clone()
    }

    pub fn payloads(&self) -> Vec<ChatEvent> {
        self.events
            .lock()
            .iter()
            .map(|event| event.payload.clone())
            .collect()
    }

    /// Concatenated `MessageDelta` text, in emission order.
    pub fn streamed_text(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match &event.payload {
                ChatEvent::MessageDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EventMsg) {
        self.events.lock().push(event);
    }
}
