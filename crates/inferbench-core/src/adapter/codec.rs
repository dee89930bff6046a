//! Buffered frame decoders for streaming wire formats
//!
//! Both decoders handle frames split across network chunks and incomplete
//! UTF-8 sequences at chunk boundaries (a multi-byte character may be split
//! across two reads). They produce frame payload strings; interpreting a
//! payload is the protocol parser's job.

/// Splits incoming bytes into complete UTF-8 text, carrying incomplete
/// trailing sequences over to the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    incomplete: Vec<u8>,
}

impl Utf8Carry {
    /// Decode a chunk, prepending any bytes carried from the previous call.
    /// Trailing bytes that do not form a complete character are buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> String {
        let bytes = if self.incomplete.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.incomplete);
            combined.extend_from_slice(chunk);
            combined
        };

        // Fast path: the whole buffer is valid UTF-8
        if let Ok(s) = std::str::from_utf8(&bytes) {
            return s.to_string();
        }

        // A UTF-8 sequence is at most 4 bytes; scan backwards for a start
        // byte whose sequence runs past the end of the buffer.
        let mut valid_end = bytes.len();
        for i in 1..=4.min(bytes.len()) {
            let pos = bytes.len() - i;
            let byte = bytes[pos];
            if (byte & 0b1100_0000) != 0b1000_0000 {
                // Start byte found; is the sequence complete?
                if bytes.len() - pos < Self::char_len(byte) {
                    valid_end = pos;
                }
                break;
            }
        }

        self.incomplete = bytes[valid_end..].to_vec();
        match std::str::from_utf8(&bytes[..valid_end]) {
            Ok(s) => s.to_string(),
            Err(e) => {
                // Genuinely invalid bytes mid-buffer; keep what decodes and
                // drop the rest rather than stalling the stream.
                let valid_up_to = e.valid_up_to();
                tracing::warn!(
                    dropped = valid_end - valid_up_to,
                    "invalid UTF-8 in stream chunk"
                );
                self.incomplete.clear();
                std::str::from_utf8(&bytes[..valid_up_to])
                    .unwrap_or_default()
                    .to_string()
            }
        }
    }

    /// True when bytes are buffered awaiting the rest of a character
    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }

    fn char_len(first_byte: u8) -> usize {
        if first_byte & 0b1000_0000 == 0 {
            1
        } else if first_byte & 0b1110_0000 == 0b1100_0000 {
            2
        } else if first_byte & 0b1111_0000 == 0b1110_0000 {
            3
        } else if first_byte & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            1 // invalid start byte, consume as a single byte
        }
    }
}

/// A decoder that turns raw bytes into complete frame payloads.
///
/// Incomplete frames are buffered for the next call; a call may return zero
/// frames (chunk ended mid-frame) or several (chunk covered multiple frames).
pub trait FrameDecoder: Send {
    /// Feed raw bytes, returning the payloads of all frames completed by them
    fn feed(&mut self, chunk: &[u8]) -> Vec<String>;

    /// True when buffered data is awaiting completion
    fn has_remaining(&self) -> bool;
}

/// SSE frame decoder: frames are `data:` payloads of events separated by
/// blank lines. Multi-line `data:` fields are joined with newlines per the
/// SSE spec; `event:`/`id:`/`retry:` fields are irrelevant on the benchmark
/// path and skipped.
#[derive(Debug, Default)]
pub struct SseFrames {
    carry: Utf8Carry,
    buffer: String,
}

impl SseFrames {
    pub fn new() -> Self {
        Self::default()
    }

    fn extract_data(event_text: &str) -> Option<String> {
        let mut data_lines: Vec<&str> = Vec::new();
        for line in event_text.lines() {
            let line = line.trim_start_matches('\r');
            if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }
        if data_lines.is_empty() {
            None
        } else {
            Some(data_lines.join("\n"))
        }
    }

    fn next_event_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.find("\n\n").map(|p| (p, 2));
        let crlf = self.buffer.find("\r\n\r\n").map(|p| (p, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
            (one, other) => one.or(other),
        }
    }
}

impl FrameDecoder for SseFrames {
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&self.carry.feed(chunk));

        let mut frames = Vec::new();
        while let Some((end, sep_len)) = self.next_event_boundary() {
            let event_text: String = self.buffer.drain(..end + sep_len).collect();
            if let Some(data) = Self::extract_data(&event_text) {
                frames.push(data);
            }
        }
        frames
    }

    fn has_remaining(&self) -> bool {
        !self.buffer.trim().is_empty() || self.carry.has_incomplete()
    }
}

/// Newline-delimited frame decoder: each non-empty line is one frame payload.
#[derive(Debug, Default)]
pub struct LineFrames {
    carry: Utf8Carry,
    buffer: String,
}

impl LineFrames {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for LineFrames {
    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&self.carry.feed(chunk));

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                frames.push(line.to_string());
            }
        }
        frames
    }

    fn has_remaining(&self) -> bool {
        !self.buffer.trim().is_empty() || self.carry.has_incomplete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_single_event() {
        let mut dec = SseFrames::new();
        let frames = dec.feed(b"data: {\"text\": \"hello\"}\n\n");
        assert_eq!(frames, vec!["{\"text\": \"hello\"}"]);
        assert!(!dec.has_remaining());
    }

    #[test]
    fn sse_event_split_across_chunks() {
        let mut dec = SseFrames::new();
        assert!(dec.feed(b"data: {\"te").is_empty());
        let frames = dec.feed(b"xt\": \"hi\"}\n\n");
        assert_eq!(frames, vec!["{\"text\": \"hi\"}"]);
    }

    #[test]
    fn sse_multiple_events_one_chunk() {
        let mut dec = SseFrames::new();
        let frames = dec.feed(b"data: first\n\ndata: second\n\n");
        assert_eq!(frames, vec!["first", "second"]);
    }

    #[test]
    fn sse_skips_event_type_lines() {
        let mut dec = SseFrames::new();
        let frames = dec.feed(b"event: token\ndata: payload\n\n");
        assert_eq!(frames, vec!["payload"]);
    }

    #[test]
    fn sse_multi_line_data_joined() {
        let mut dec = SseFrames::new();
        let frames = dec.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(frames, vec!["line1\nline2"]);
    }

    #[test]
    fn sse_windows_line_endings() {
        let mut dec = SseFrames::new();
        let frames = dec.feed(b"data: value\r\n\r\n");
        assert_eq!(frames, vec!["value"]);
    }

    #[test]
    fn sse_done_marker_passes_through() {
        let mut dec = SseFrames::new();
        let frames = dec.feed(b"data: [DONE]\n\n");
        assert_eq!(frames, vec!["[DONE]"]);
    }

    #[test]
    fn sse_utf8_split_mid_character() {
        // "é" is C3 A9
        let mut dec = SseFrames::new();
        assert!(dec.feed(b"data: caf\xC3").is_empty());
        let frames = dec.feed(b"\xA9\n\n");
        assert_eq!(frames, vec!["café"]);
    }

    #[test]
    fn sse_four_byte_emoji_split() {
        // "😀" is F0 9F 98 80
        let mut dec = SseFrames::new();
        assert!(dec.feed(b"data: hi\xF0\x9F").is_empty());
        let frames = dec.feed(b"\x98\x80\n\n");
        assert_eq!(frames, vec!["hi😀"]);
    }

    #[test]
    fn lines_split_across_chunks() {
        let mut dec = LineFrames::new();
        assert!(dec.feed(b"{\"response\":").is_empty());
        let frames = dec.feed(b" \"a\"}\n{\"done\": true}\n");
        assert_eq!(frames, vec!["{\"response\": \"a\"}", "{\"done\": true}"]);
        assert!(!dec.has_remaining());
    }

    #[test]
    fn lines_skip_blank_lines() {
        let mut dec = LineFrames::new();
        let frames = dec.feed(b"a\n\n\nb\n");
        assert_eq!(frames, vec!["a", "b"]);
    }

    #[test]
    fn lines_utf8_split_mid_character() {
        // "中" is E4 B8 AD
        let mut dec = LineFrames::new();
        assert!(dec.feed(b"{\"t\": \"\xE4\xB8").is_empty());
        let frames = dec.feed(b"\xAD\"}\n");
        assert_eq!(frames, vec!["{\"t\": \"中\"}"]);
    }

    #[test]
    fn lines_trailing_data_is_remaining() {
        let mut dec = LineFrames::new();
        dec.feed(b"incomplete");
        assert!(dec.has_remaining());
    }
}
