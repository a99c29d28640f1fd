//! Newline-delimited JSON parser
//!
//! Splits the raw event stream into lines and decodes each non-blank line as
//! one JSON document. Blank lines are keep-alives.

use bytes::Bytes;
use serde_json::Value;
use tracing::trace;

use super::types::DeliveryError;

/// Incremental line parser state
#[derive(Debug, Default)]
pub struct LineParser {
    /// Buffer for incomplete lines
    buffer: Vec<u8>,
}

impl LineParser {
    /// Create a new line parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and decode any complete lines, in order
    pub fn feed(&mut self, bytes: &Bytes) -> Vec<Result<Value, DeliveryError>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }

        events
    }

    /// Decode whatever is left once the stream has ended
    ///
    /// A final line without a trailing newline is still an event.
    pub fn finish(&mut self) -> Option<Result<Value, DeliveryError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }

    /// Bytes buffered for a line not yet terminated
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<Result<Value, DeliveryError>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if line.iter().all(u8::is_ascii_whitespace) {
        trace!("Keep-alive line");
        return None;
    }

    Some(
        serde_json::from_slice(line)
            .map_err(|e| DeliveryError::malformed(String::from_utf8_lossy(line), e)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_lines_skipping_blank() {
        let mut parser = LineParser::new();

        let events = parser.feed(&Bytes::from_static(b"{\"a\":1}\n\n{\"b\":2}\n"));

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &json!({"a": 1}));
        assert_eq!(events[1].as_ref().unwrap(), &json!({"b": 2}));
    }

    #[test]
    fn test_parse_chunked_data() {
        let mut parser = LineParser::new();

        // First chunk - incomplete
        let events1 = parser.feed(&Bytes::from_static(b"{\"name\":\"temp\",\"da"));
        assert_eq!(events1.len(), 0);
        assert!(parser.pending() > 0);

        // Second chunk - completes the line
        let events2 = parser.feed(&Bytes::from_static(b"ta\":\"21\"}\n"));
        assert_eq!(events2.len(), 1);
        assert_eq!(
            events2[0].as_ref().unwrap(),
            &json!({"name": "temp", "data": "21"})
        );
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_crlf_and_whitespace_keepalives() {
        let mut parser = LineParser::new();

        let events = parser.feed(&Bytes::from_static(b"\r\n  \n{\"x\":true}\r\n"));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &json!({"x": true}));
    }

    #[test]
    fn test_malformed_line_does_not_poison_parser() {
        let mut parser = LineParser::new();

        let events = parser.feed(&Bytes::from_static(b"not-json\n{\"c\":3}\n"));

        assert_eq!(events.len(), 2);
        match &events[0] {
            Err(DeliveryError::MalformedEvent { line, .. }) => assert_eq!(line, "not-json"),
            other => panic!("expected malformed event, got {:?}", other),
        }
        assert_eq!(events[1].as_ref().unwrap(), &json!({"c": 3}));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = LineParser::new();

        assert!(parser.feed(&Bytes::from_static(b"{\"last\":1}")).is_empty());
        let last = parser.finish().unwrap().unwrap();
        assert_eq!(last, json!({"last": 1}));
        assert!(parser.finish().is_none());
    }
}
