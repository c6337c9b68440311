//! Incremental Server-Sent Events parser for streamed completions.
//!
//! Bytes are buffered until a full line is available, so multi-byte
//! characters split across network chunks decode correctly.

/// A parsed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if present
    pub event_type: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl SseEvent {
    /// Whether this is the `[DONE]` sentinel
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        event
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.has_data().then(|| self.build());
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_string()),
                "event" => self.event_type = Some(value.to_string()),
                _ => {}
            }
        }
        None
    }
}

fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let field = &line[..colon];
    let value = &line[colon + 1..];
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

/// Feed chunks with [`SseLineParser::push`], call [`SseLineParser::flush`]
/// at end of stream.
#[derive(Debug, Default)]
pub struct SseLineParser {
    buffer: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and return the events it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                events.push(event);
            }
        }

        events
    }

    /// Emit whatever is left once the byte stream has ended
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                return Some(event);
            }
        }
        self.builder.has_data().then(|| self.builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_across_chunks() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: {\"a\":").is_empty());
        let events = parser.push(b"1}\n\ndata: [DONE]\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "{\"a\":1}");
        assert!(events[1].is_done());
    }

    #[test]
    fn test_split_multibyte_character() {
        let text = "data: Hej på dig\n\n".as_bytes();
        // Split inside the two-byte 'å'
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut parser = SseLineParser::new();
        assert!(parser.push(&text[..split]).is_empty());
        let events = parser.push(&text[split..]);
        assert_eq!(events[0].data, "Hej på dig");
    }

    #[test]
    fn test_comments_crlf_and_event_type() {
        let mut parser = SseLineParser::new();
        let events = parser.push(b": keep-alive\r\nevent: delta\r\ndata: x\r\ndata: y\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "x\ny");
    }

    #[test]
    fn test_flush_trailing_event() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: tail").is_empty());
        assert_eq!(parser.flush().unwrap().data, "tail");
        assert!(parser.flush().is_none());
    }
}
