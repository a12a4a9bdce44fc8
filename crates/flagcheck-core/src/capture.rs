// crates/flagcheck-core/src/capture.rs
// ============================================================================
// Module: Output Capture
// Description: Bounded in-memory capture of subprocess output streams.
// Purpose: Keep diagnostic output without unbounded memory growth.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`CapturedOutput`] keeps the most recent `limit` bytes of a stream. Build
//! tools report failures at the end of their output, so the tail is what a
//! failing assertion needs. Truncation is recorded and rendered as a marker.

// ============================================================================
// SECTION: Captured Output
// ============================================================================

/// Tail-bounded capture of a byte stream.
///
/// # Invariants
/// - At most `limit` bytes are exposed by [`CapturedOutput::as_bytes`].
/// - `total_bytes` counts every byte pushed, retained or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Buffered bytes; may temporarily hold up to twice `limit`.
    buffer: Vec<u8>,
    /// Maximum number of retained bytes.
    limit: usize,
    /// Total bytes observed on the stream.
    total_bytes: u64,
}

impl CapturedOutput {
    /// Creates an empty capture retaining at most `limit` bytes.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            total_bytes: 0,
        }
    }

    /// Creates a capture holding `bytes`, truncated to `limit`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], limit: usize) -> Self {
        let mut capture = Self::new(limit);
        capture.push(bytes);
        capture
    }

    /// Appends a chunk, discarding the oldest bytes past the limit.
    pub fn push(&mut self, chunk: &[u8]) {
        self.total_bytes = self.total_bytes.saturating_add(chunk.len() as u64);
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > self.limit.saturating_mul(2) {
            let excess = self.buffer.len() - self.limit;
            self.buffer.drain(.. excess);
        }
    }

    /// Returns the retained tail of the stream.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let start = self.buffer.len().saturating_sub(self.limit);
        &self.buffer[start ..]
    }

    /// Returns the total number of bytes observed.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Returns the number of bytes dropped from the head of the stream.
    #[must_use]
    pub fn dropped_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.as_bytes().len() as u64)
    }

    /// Returns true when older output was discarded.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.dropped_bytes() > 0
    }

    /// Returns true when nothing was captured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Renders the retained tail as lossy UTF-8, prefixed by a truncation marker.
    #[must_use]
    pub fn text(&self) -> String {
        let body = String::from_utf8_lossy(self.as_bytes());
        if self.is_truncated() {
            format!("[... {} bytes truncated ...]\n{body}", self.dropped_bytes())
        } else {
            body.into_owned()
        }
    }

    /// Renders at most the last `lines` lines of the captured text.
    #[must_use]
    pub fn tail_lines(&self, lines: usize) -> String {
        let text = self.text();
        let collected: Vec<&str> = text.lines().collect();
        let start = collected.len().saturating_sub(lines);
        let mut tail = String::new();
        if start > 0 {
            tail.push_str(&format!("[... {start} earlier lines omitted ...]\n"));
        }
        for line in &collected[start ..] {
            tail.push_str(line);
            tail.push('\n');
        }
        tail
    }
}
