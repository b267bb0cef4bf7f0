use serde::Serialize;

/// Knowledge about one text channel: nothing < partial (open) < complete (closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    Unopened,
    Open,
    Closed,
}

/// Monotone text accumulator. Its length never decreases.
#[derive(Debug, Clone, Default)]
pub struct TextStream {
    text: String,
    state: StreamState,
}

impl TextStream {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Open
    }

    /// Append a delta. The first delta opens the stream; a closed stream
    /// already holds the full value and ignores deltas.
    pub fn append(&mut self, delta: &str) -> bool {
        match self.state {
            StreamState::Closed => false,
            StreamState::Unopened | StreamState::Open => {
                self.state = StreamState::Open;
                self.text.push_str(delta);
                true
            }
        }
    }

    /// Offer a full value from a snapshot. Replaces the accumulator only when
    /// the offer is non-empty and longer than what is already held, then
    /// closes the stream.
    pub fn offer_full(&mut self, full: &str) -> bool {
        if full.is_empty() || full.len() <= self.text.len() {
            return false;
        }
        self.text = full.to_string();
        self.state = StreamState::Closed;
        true
    }

    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delta_opens_stream() {
        let mut stream = TextStream::default();
        assert_eq!(stream.state(), StreamState::Unopened);
        assert!(stream.append("Hel"));
        assert!(stream.is_streaming());
        assert!(stream.append("lo"));
        assert_eq!(stream.text(), "Hello");
    }

    #[test]
    fn longer_full_value_replaces_and_closes() {
        let mut stream = TextStream::default();
        stream.append("Full");
        assert!(stream.offer_full("Full answer"));
        assert_eq!(stream.text(), "Full answer");
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(!stream.offer_full("Full answer"));
    }

    #[test]
    fn shorter_or_empty_full_value_never_truncates() {
        let mut stream = TextStream::default();
        stream.append("Already longer text");
        assert!(!stream.offer_full("Already"));
        assert!(!stream.offer_full(""));
        assert_eq!(stream.text(), "Already longer text");
        assert!(stream.is_streaming());
    }

    #[test]
    fn closed_stream_ignores_deltas_but_accepts_longer_full_value() {
        let mut stream = TextStream::default();
        stream.offer_full("partial answer");
        assert!(!stream.append(" answer"));
        assert_eq!(stream.text(), "partial answer");
        assert!(stream.offer_full("partial answer, finished"));
        assert_eq!(stream.text(), "partial answer, finished");
    }
}
