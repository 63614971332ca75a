//! Per-connection stream state.
//!
//! Each source tracks the state of the connection to its sink in its
//! [`SinkSlot`](super::SinkSlot).

// ---------------------------------------------------------------------------
// StreamState
// ---------------------------------------------------------------------------

/// State of one source → sink connection.
///
/// The transitions are:
///
/// ```text
/// Idle ──write (n > 0)──▶ Active
///      ──flush──────────▶ Flushing
/// Active ──flush────────▶ Flushing
/// Flushing ──flush ack──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Nothing written since the last acknowledged flush.
    #[default]
    Idle,

    /// Samples have been written and no flush has been requested yet.
    Active,

    /// A flush has been issued and the sink has not acknowledged it.
    Flushing,
}

impl StreamState {
    /// Returns `true` while the connection carries unacknowledged samples.
    ///
    /// ```
    /// use ham_stream::pipeline::StreamState;
    ///
    /// assert!(!StreamState::Idle.is_busy());
    /// assert!(StreamState::Active.is_busy());
    /// assert!(StreamState::Flushing.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, StreamState::Active | StreamState::Flushing)
    }

    /// A short human-readable label for log output.
    pub fn label(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Active => "active",
            StreamState::Flushing => "flushing",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- StreamState::is_busy ---

    #[test]
    fn idle_is_not_busy() {
        assert!(!StreamState::Idle.is_busy());
    }

    #[test]
    fn active_is_busy() {
        assert!(StreamState::Active.is_busy());
    }

    #[test]
    fn flushing_is_busy() {
        assert!(StreamState::Flushing.is_busy());
    }

    // ---- StreamState::label ---

    #[test]
    fn labels() {
        assert_eq!(StreamState::Idle.label(), "idle");
        assert_eq!(StreamState::Active.label(), "active");
        assert_eq!(StreamState::Flushing.label(), "flushing");
        assert_eq!(StreamState::Flushing.to_string(), "flushing");
    }

    // ---- Default ---

    #[test]
    fn default_stream_state_is_idle() {
        assert_eq!(StreamState::default(), StreamState::Idle);
    }
}
