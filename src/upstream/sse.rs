//! Incremental decoder for upstream SSE streams.
//!
//! Buffers raw bytes across TCP chunk boundaries, reassembles complete
//! lines, and hands back the payload of every `data:` line. Other SSE
//! fields (`event:`, `id:`, `retry:`) and comments are skipped.

use super::UpstreamError;

/// Maximum number of bytes held while waiting for a line terminator.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Payload marking the end of an OpenAI-style stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Line-buffered extractor of `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return the data payloads of every line it
    /// completed, in order.
    ///
    /// A partial line longer than 64 KiB is an error. Payloads completed by
    /// the same chunk are returned first and the overflow is reported by the
    /// next call.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, UpstreamError> {
        self.check_pending()?;
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line[..line.len() - 1]) {
                payloads.push(data);
            }
        }

        if payloads.is_empty() {
            self.check_pending()?;
        }
        Ok(payloads)
    }

    /// Flush whatever is left as a final, unterminated line.
    pub fn finish(mut self) -> Result<Option<String>, UpstreamError> {
        self.check_pending()?;
        let rest = std::mem::take(&mut self.buffer);
        Ok(data_payload(&rest))
    }

    fn check_pending(&mut self) -> Result<(), UpstreamError> {
        if self.buffer.len() <= MAX_PENDING_BYTES {
            return Ok(());
        }
        tracing::warn!(
            pending = self.buffer.len(),
            "SSE line exceeded buffer cap, dropping stream"
        );
        self.buffer.clear();
        Err(UpstreamError::InvalidResponse(
            "SSE line exceeded 64 KiB".to_string(),
        ))
    }
}

/// Extract the payload of a single SSE line, if it is a `data:` line.
fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    let data = text.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    Some(data.to_string())
}
