//! Console output capture for guest executions.

use std::io::Write;

/// Bounded buffer for guest console output.
///
/// Owned by the store, so writes never contend. Bytes past the limit are
/// discarded and the capture is marked truncated.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl OutputCapture {
    /// Create a capture keeping at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append text.
    pub fn write_str(&mut self, text: &str) {
        self.push(text.as_bytes());
    }

    /// Append text followed by a newline.
    pub fn write_line(&mut self, text: &str) {
        self.push(text.as_bytes());
        self.push(b"\n");
    }

    fn push(&mut self, bytes: &[u8]) {
        if self.truncated {
            return;
        }
        let room = self.limit.saturating_sub(self.buffer.len());
        if bytes.len() <= room {
            self.buffer.extend_from_slice(bytes);
            return;
        }
        // Cut before a UTF-8 continuation byte so no character is split.
        let mut cut = room;
        while cut > 0 && bytes[cut] & 0b1100_0000 == 0b1000_0000 {
            cut -= 1;
        }
        self.buffer.extend_from_slice(&bytes[..cut]);
        self.truncated = true;
    }

    /// Whether output was dropped at the limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Get the length of captured data.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the captured output as a string.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

impl Write for OutputCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
