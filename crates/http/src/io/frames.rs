use std::collections::VecDeque;

use chatline_protocol::FrameDecoder;

use super::{Chunks, ChunksError};

/// Reads frame payloads from a chunked response body.
pub struct FrameReader {
    chunks: Chunks,
    decoder: FrameDecoder,
    ready: VecDeque<String>,
}

impl FrameReader {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            chunks,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Returns the next frame payload, or `None` when the body has ended.
    ///
    /// A fragment left unterminated at the end of the body is dropped.
    pub async fn next_frame(
        &mut self,
    ) -> Result<Option<String>, ChunksError> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let Some(bytes) = self.chunks.next_chunk().await? else {
                let dropped = self.decoder.finish();
                if dropped > 0 {
                    trace!("dropped {dropped} bytes of unterminated frame");
                }
                return Ok(None);
            };
            self.ready.extend(self.decoder.push(&bytes));
        }
    }
}
