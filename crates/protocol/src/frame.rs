const DATA_FIELD: &str = "data:";

/// An incremental decoder that splits a byte stream into frame payloads.
///
/// The stream is a sequence of newline-terminated lines. Lines starting
/// with `data:` carry a payload, everything else (keep-alive comments,
/// blank separators, other fields) is noise and gets dropped. Bytes after
/// the last newline are held back until more input arrives, so a chunk
/// boundary may fall anywhere, even inside a multi-byte character.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    // Start of the bytes not decoded yet.
    pos: usize,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the frames it completes.
    ///
    /// The returned iterator is lazy: each frame is cut out of the buffer
    /// when it is pulled. Frames not pulled before the next `push` are
    /// still delivered, in order, by that call.
    pub fn push<'a>(
        &'a mut self,
        chunk: &[u8],
    ) -> impl Iterator<Item = String> + use<'a> {
        // Compact once per chunk instead of once per line.
        self.buf.drain(..self.pos);
        self.pos = 0;
        self.buf.extend_from_slice(chunk);
        std::iter::from_fn(move || self.next_frame())
    }

    /// Pulls the next complete frame out of the buffer.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let rest = &self.buf[self.pos..];
            let eol_idx = rest.iter().position(|b| *b == b'\n')?;
            let line = String::from_utf8_lossy(&rest[..eol_idx]);
            let payload = payload_of(&line).map(ToOwned::to_owned);
            self.pos += eol_idx + 1;
            if payload.is_some() {
                return payload;
            }
        }
    }

    /// Returns the number of buffered bytes not decoded yet.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Ends the stream, dropping any unterminated fragment.
    ///
    /// Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.pending_len();
        self.buf.clear();
        self.pos = 0;
        dropped
    }
}

fn payload_of(line: &str) -> Option<&str> {
    let payload = line.trim().strip_prefix(DATA_FIELD)?.trim();
    if payload.is_empty() {
        return None;
    }
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StreamEvent, parse_event};

    #[test]
    fn test_normal_frames() {
        let mut decoder = FrameDecoder::new();
        let frames: Vec<_> = decoder
            .push(b"data: {\"type\":\"start\"}\ndata: hello\n")
            .collect();
        assert_eq!(frames, vec![r#"{"type":"start"}"#, "hello"]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(b"data: {\"typ").count(), 0);
        let frames: Vec<_> = decoder
            .push(b"e\":\"token\",\"token\":\"hi\"}\n")
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            parse_event(&frames[0]),
            StreamEvent::Token {
                token: "hi".to_owned()
            }
        );
    }

    #[test]
    fn test_split_inside_character() {
        let bytes = "data: héllo\n".as_bytes();
        // Split in the middle of `é`.
        let (head, tail) = bytes.split_at(8);
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(head).count(), 0);
        let frames: Vec<_> = decoder.push(tail).collect();
        assert_eq!(frames, vec!["héllo"]);
    }

    #[test]
    fn test_noise_is_dropped() {
        let mut decoder = FrameDecoder::new();
        let frames: Vec<_> = decoder
            .push(b": keep-alive\n\nevent: ping\ndata:\ndata:   \r\n")
            .collect();
        assert!(frames.is_empty());

        let frames: Vec<_> =
            decoder.push(b"  data:x\r\n\ndata:  y  \n").collect();
        assert_eq!(frames, vec!["x", "y"]);
    }

    #[test]
    fn test_many_lines_in_one_chunk() {
        let mut chunk = Vec::new();
        for i in 0..100 {
            let lines = format!(": ping {i}\ndata: {i}\n");
            chunk.extend_from_slice(lines.as_bytes());
        }
        chunk.extend_from_slice(b"data: tail");

        let mut decoder = FrameDecoder::new();
        let frames: Vec<_> = decoder.push(&chunk).collect();
        assert_eq!(frames.len(), 100);
        assert_eq!(frames[0], "0");
        assert_eq!(frames[99], "99");
        assert_eq!(decoder.pending_len(), 10);

        // Frames left unpulled are delivered by the next push.
        let mut frames = decoder.push(b"\ndata: a\n");
        assert_eq!(frames.next().as_deref(), Some("tail"));
        drop(frames);
        let frames: Vec<_> = decoder.push(b"data: b\n").collect();
        assert_eq!(frames, vec!["a", "b"]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_unterminated_tail_is_never_emitted() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(b"data: a\ndata: b").count(), 1);
        assert_eq!(decoder.pending_len(), 7);
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.finish(), 7);
        assert_eq!(decoder.pending_len(), 0);
    }
}
