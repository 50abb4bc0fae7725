//! Incremental decoder for `text/event-stream` bodies.
//!
//! Network chunks do not respect line boundaries, so partial lines are held
//! back until their newline arrives.

/// One decoded server-sent event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// The payload of a `data:` line.
    Data(String),
    /// The `data: [DONE]` terminator used by OpenAI-compatible APIs.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final unterminated line, if any.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    // Comments (": keep-alive") and other fields carry no payload.
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_lines() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b"data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".into()), SseEvent::Done]
        );
    }

    #[test]
    fn holds_partial_lines_until_newline() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: {\"text\":\"he").is_empty());
        let events = dec.push(b"llo\"}\r\n");
        assert_eq!(events, vec![SseEvent::Data("{\"text\":\"hello\"}".into())]);
    }

    #[test]
    fn skips_comments_and_other_fields() {
        let mut dec = SseDecoder::new();
        let events = dec.push(b": keep-alive\nevent: message\nid: 4\ndata:x\n");
        assert_eq!(events, vec![SseEvent::Data("x".into())]);
    }

    #[test]
    fn multibyte_split_across_chunks_is_preserved() {
        let text = "data: é\n".as_bytes();
        let mut dec = SseDecoder::new();
        assert!(dec.push(&text[..7]).is_empty());
        assert_eq!(dec.push(&text[7..]), vec![SseEvent::Data("é".into())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: tail").is_empty());
        assert_eq!(dec.finish(), Some(SseEvent::Data("tail".into())));
        assert_eq!(dec.finish(), None);
    }
}
