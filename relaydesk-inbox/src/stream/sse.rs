//! Incremental `text/event-stream` framing.

use super::RawEvent;

const DEFAULT_EVENT_KIND: &str = "message";

/// Turns arbitrary byte chunks into complete [`RawEvent`]s.
///
/// Chunks may split lines, and lines may split multi-byte characters; only
/// complete lines are decoded. Events are dispatched on a blank line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    kind: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds one chunk and returns every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<RawEvent> {
        if !self.pending.is_empty() {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<RawEvent> {
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
            "event" => self.kind = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` are not used: reconnect timing is fixed client-side.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<RawEvent> {
        let kind = self.kind.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(RawEvent {
            kind: kind
                .filter(|kind| !kind.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_KIND.to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_event() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"event: NEW_MESSAGE\ndata: {\"content\":\"hi\"}\n\n");
        assert_eq!(
            events,
            vec![RawEvent {
                kind: "NEW_MESSAGE".into(),
                data: "{\"content\":\"hi\"}".into(),
            }]
        );
    }

    #[test]
    fn unnamed_event_defaults_to_message() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b"data: ping\n\n");
        assert_eq!(events[0].kind, "message");
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let events = decoder.feed(b": keep-alive\nevent: X\ndata: a\ndata: b\nid: 7\nretry: 1000\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn handles_chunks_split_mid_line_and_mid_character() {
        let mut decoder = SseDecoder::default();
        let payload = "event: NEW_MESSAGE\r\ndata: {\"content\":\"¿qué?\"}\r\n\r\n".as_bytes();
        let split = payload
            .iter()
            .position(|byte| *byte >= 0x80)
            .expect("payload has a multi-byte character")
            + 1;

        assert!(decoder.feed(&payload[..split]).is_empty());
        let events = decoder.feed(&payload[split..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"content\":\"¿qué?\"}");
    }

    #[test]
    fn blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"event: NEW_MESSAGE\n\n\n").is_empty());
        // The type of a data-less event must not leak into the next one.
        let events = decoder.feed(b"data: x\n\n");
        assert_eq!(events[0].kind, "message");
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"event: A\ndata: tail").is_empty());
        let event = decoder.finish().expect("trailing event");
        assert_eq!(event.kind, "A");
        assert_eq!(event.data, "tail");
    }
}
