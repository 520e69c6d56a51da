//! Incremental Server-Sent Events parsing for streaming HTTP bodies.

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct SseEvent {
    pub(crate) event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub(crate) data: String,
}

/// Byte-oriented SSE parser.
///
/// Lines are split on raw bytes so multi-byte characters that straddle chunk
/// boundaries decode correctly.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every event completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Dispatch whatever is buffered once the body ends.
    pub(crate) fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{SseEvent, SseParser};
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_events_across_arbitrary_chunks() {
        let mut parser = SseParser::new();
        assert_eq!(parser.push(b"data: {\"a\""), Vec::new());
        let events = parser.push(b":1}\r\n\r\nevent: ping\ndata: x\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: None,
                data: "{\"a\":1}".to_string()
            }]
        );
        assert_eq!(
            parser.push(b"\n"),
            vec![SseEvent {
                event: Some("ping".to_string()),
                data: "x".to_string()
            }]
        );
    }

    #[test]
    fn joins_multi_line_data_and_skips_comments() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\ndata: one\ndata: two\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let mut parser = SseParser::new();
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).expect("lead byte") + 1;
        assert_eq!(parser.push(&bytes[..split]), Vec::new());
        let events = parser.push(&bytes[split..]);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert_eq!(parser.push(b"data: tail"), Vec::new());
        assert_eq!(parser.finish().map(|event| event.data), Some("tail".to_string()));
        assert_eq!(parser.finish(), None);
    }
}
