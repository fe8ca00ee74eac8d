/// Running buffer that reassembles streamed fragments into one reply
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    /// Accumulated text buffer
    text_buffer: String,
    /// Number of non-empty fragments seen
    fragments: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the full text so far.
    pub fn push_delta(&mut self, delta: &str) -> &str {
        if !delta.is_empty() {
            self.fragments += 1;
            self.text_buffer.push_str(delta);
        }
        &self.text_buffer
    }

    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.text_buffer.is_empty()
    }
}
