// Line framing for the event stream

use tracing::{debug, trace, warn};

/// Prefix marking a frame that carries a record.
pub const PAYLOAD_MARKER: &str = "data: ";

/// Splits a byte stream into newline-terminated frames, keeping only payload frames.
///
/// Holds at most one pending partial line between reads. Lines are decoded as
/// UTF-8 only once complete, so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
pub struct FrameDemux {
    pending: Vec<u8>,
}

impl FrameDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and collect the marker-stripped payload of every complete
    /// payload frame it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            match std::str::from_utf8(&self.pending[start..end]) {
                Ok(line) => {
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    if let Some(payload) = line.strip_prefix(PAYLOAD_MARKER) {
                        payloads.push(payload.to_string());
                    } else if !line.is_empty() {
                        trace!(frame = %line, "Skipping non-payload frame");
                    }
                }
                Err(e) => warn!(error = %e, bytes = end - start, "Dropping frame that is not valid UTF-8"),
            }
            start = end + 1;
        }
        self.pending.drain(..start);

        payloads
    }

    /// Bytes held back waiting for a line terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// End of stream: an unterminated trailing fragment is a truncated frame and is
    /// discarded unparsed.
    pub fn finish(&mut self) {
        if self.pending_len() > 0 {
            debug!(bytes = self.pending_len(), "Discarding truncated trailing frame");
            self.pending.clear();
        }
    }
}
