//! Server-sent-event framing.
//!
//! Two dialects cover every SSE provider here:
//!
//! - **Named events** (Anthropic): `event: <type>` followed by `data: <json>`,
//!   blank-line separated. A frame is delivered only when both halves have
//!   arrived; parser state resets after each delivery.
//! - **Anonymous data** (OpenAI-compatible, Vertex): bare `data: <json>`
//!   lines, optionally terminated by `data: [DONE]`.
//!
//! Comment lines (leading `:`) and blank lines never produce frames.

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Event {
        /// Event type; always present in named mode, never in data mode.
        event: Option<String>,
        data: String,
    },
    /// The `data: [DONE]` terminator.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseMode {
    /// `event:`/`data:` pairs.
    NamedEvent,
    /// `data:` lines only.
    DataOnly,
}

/// Incremental SSE parser. Feed it raw body bytes as they arrive; complete
/// frames come back in wire order. Partial lines are buffered across pushes.
#[derive(Debug)]
pub struct SseParser {
    mode: SseMode,
    buffer: String,
    pending_event: Option<String>,
}

impl SseParser {
    pub fn new(mode: SseMode) -> Self {
        Self {
            mode,
            buffer: String::new(),
            pending_event: None,
        }
    }

    /// Consume a chunk of body bytes and return every frame completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.push_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        // Blank lines separate events; comment lines are skipped. Both reset
        // nothing by themselves in named mode; only delivery resets state.
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        if let Some(event_type) = line.strip_prefix("event:") {
            if self.mode == SseMode::NamedEvent {
                self.pending_event = Some(event_type.trim().to_string());
            }
            return None;
        }

        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data == "[DONE]" {
                return Some(SseFrame::Done);
            }
            match self.mode {
                SseMode::NamedEvent => {
                    // Only a complete (event, data) pair produces a frame.
                    let event = self.pending_event.take()?;
                    return Some(SseFrame::Event {
                        event: Some(event),
                        data: data.to_string(),
                    });
                }
                SseMode::DataOnly => {
                    if data.is_empty() {
                        return None;
                    }
                    return Some(SseFrame::Event {
                        event: None,
                        data: data.to_string(),
                    });
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event_pairing() {
        let mut parser = SseParser::new(SseMode::NamedEvent);
        let frames = parser.push(
            b"event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
        );
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                event: Some("message_start".to_string()),
                data: "{\"type\":\"message_start\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_named_mode_data_without_event_is_dropped() {
        let mut parser = SseParser::new(SseMode::NamedEvent);
        let frames = parser.push(b"data: {\"orphan\":true}\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_named_mode_state_resets_after_delivery() {
        let mut parser = SseParser::new(SseMode::NamedEvent);
        let frames = parser.push(b"event: ping\ndata: {}\ndata: {\"second\":1}\n");
        // The second data line has no pending event and must not fire.
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_comment_and_blank_lines_skipped() {
        let mut parser = SseParser::new(SseMode::NamedEvent);
        let frames = parser.push(b": keep-alive\n\nevent: delta\n: mid-comment\ndata: {\"x\":1}\n");
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            SseFrame::Event { event, .. } => assert_eq!(event.as_deref(), Some("delta")),
            _ => panic!("expected event"),
        }
    }

    #[test]
    fn test_data_only_mode() {
        let mut parser = SseParser::new(SseMode::DataOnly);
        let frames = parser.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: [DONE]\n\n");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], SseFrame::Done);
    }

    #[test]
    fn test_partial_line_buffered_across_pushes() {
        let mut parser = SseParser::new(SseMode::DataOnly);
        assert!(parser.push(b"data: {\"spl").is_empty());
        let frames = parser.push(b"it\":true}\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                event: None,
                data: "{\"split\":true}".to_string(),
            }]
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new(SseMode::DataOnly);
        let frames = parser.push(b"data: {\"a\":1}\r\n\r\n");
        assert_eq!(frames.len(), 1);
    }
}
