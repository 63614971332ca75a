//! The voting state machine, free of audio and timers.
//!
//! ```text
//!            open (arm timer)          expiry
//!   Idle ────────────────────▶ Voting ────────▶ Active
//!    ▲   ◀──── last candidate         (best_rx)  (active_rx)
//!    │         closed, nothing                       │
//!    │         left at expiry                        │
//!    └────────────── active receiver closes ─────────┘
//! ```
//!
//! `active_rx` and `best_rx` are never set at the same time.

/// Level a new voting round starts from.
pub const BEST_RX_SIGLEV_RESET: f32 = -100.0;

/// Result of [`VotingState::squelch_opened`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A receiver is already active; the opening does not take part.
    Ignored,
    /// First candidate of a voting round; the voting timer must be (re)armed.
    FirstCandidate,
    /// The receiver is stronger than the previous candidate and replaced it.
    NewCandidate,
    /// The receiver is not stronger than the current candidate.
    Weaker,
}

/// Result of [`VotingState::squelch_closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The active receiver closed; the state is back to idle.
    ActiveClosed,
    /// The candidate closed.  `new_best` is the strongest receiver still open.
    CandidateClosed { new_best: Option<usize> },
    /// Neither active nor candidate.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VotingState {
    active_rx: Option<usize>,
    best_rx: Option<usize>,
    best_level: f32,
}

impl Default for VotingState {
    fn default() -> Self {
        Self {
            active_rx: None,
            best_rx: None,
            best_level: BEST_RX_SIGLEV_RESET,
        }
    }
}

impl VotingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_rx(&self) -> Option<usize> {
        self.active_rx
    }

    pub fn best_rx(&self) -> Option<usize> {
        self.best_rx
    }

    pub fn best_level(&self) -> f32 {
        self.best_level
    }

    /// A voting round is in progress.
    pub fn is_voting(&self) -> bool {
        self.best_rx.is_some()
    }

    /// Receiver `rx` opened its squelch at `level`.  The first opening of a
    /// round always becomes the candidate, whatever its level; after that
    /// only a strictly higher level replaces it.
    pub fn squelch_opened(&mut self, rx: usize, level: f32) -> OpenOutcome {
        if self.active_rx.is_some() {
            return OpenOutcome::Ignored;
        }
        let first = self.best_rx.is_none();
        let outcome = if first || level > self.best_level {
            self.best_rx = Some(rx);
            self.best_level = level;
            if first {
                OpenOutcome::FirstCandidate
            } else {
                OpenOutcome::NewCandidate
            }
        } else {
            OpenOutcome::Weaker
        };
        self.check();
        outcome
    }

    /// Receiver `rx` closed its squelch.  `still_open` lists the other
    /// receivers whose squelch is open, with their levels, in configuration
    /// order.
    pub fn squelch_closed(&mut self, rx: usize, still_open: &[(usize, f32)]) -> CloseOutcome {
        if self.active_rx == Some(rx) {
            self.active_rx = None;
            self.check();
            return CloseOutcome::ActiveClosed;
        }
        if self.best_rx != Some(rx) {
            return CloseOutcome::Ignored;
        }

        self.best_rx = None;
        self.best_level = BEST_RX_SIGLEV_RESET;
        for &(other, level) in still_open {
            if other != rx && (self.best_rx.is_none() || level > self.best_level) {
                self.best_rx = Some(other);
                self.best_level = level;
            }
        }
        self.check();
        CloseOutcome::CandidateClosed {
            new_best: self.best_rx,
        }
    }

    /// The voting delay expired.  Promotes the candidate, returning it with
    /// its level; `None` when nobody is left.
    pub fn choose_best(&mut self) -> Option<(usize, f32)> {
        let best = self.best_rx.take()?;
        let level = std::mem::replace(&mut self.best_level, BEST_RX_SIGLEV_RESET);
        self.active_rx = Some(best);
        self.check();
        Some((best, level))
    }

    /// Forget the active receiver and any round in progress.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn check(&self) {
        debug_assert!(
            self.active_rx.is_none() || self.best_rx.is_none(),
            "active and candidate receiver set at the same time"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- candidates ---------------------------------------------------------

    #[test]
    fn stronger_receiver_replaces_candidate() {
        let mut s = VotingState::new();
        assert_eq!(s.squelch_opened(0, 5.0), OpenOutcome::FirstCandidate);
        assert_eq!(s.squelch_opened(1, 8.0), OpenOutcome::NewCandidate);
        assert_eq!(s.best_rx(), Some(1));
        assert_eq!(s.best_level(), 8.0);

        assert_eq!(s.choose_best(), Some((1, 8.0)));
        assert_eq!(s.active_rx(), Some(1));
        assert_eq!(s.best_rx(), None);
        assert_eq!(s.best_level(), BEST_RX_SIGLEV_RESET);
    }

    #[test]
    fn equal_level_keeps_the_first_candidate() {
        let mut s = VotingState::new();
        s.squelch_opened(0, 5.0);
        assert_eq!(s.squelch_opened(1, 5.0), OpenOutcome::Weaker);
        assert_eq!(s.squelch_opened(2, 4.0), OpenOutcome::Weaker);
        assert_eq!(s.best_rx(), Some(0));
    }

    #[test]
    fn very_weak_first_opening_becomes_the_candidate() {
        let mut s = VotingState::new();
        assert_eq!(s.squelch_opened(0, -120.0), OpenOutcome::FirstCandidate);
        assert_eq!(s.best_rx(), Some(0));
        assert_eq!(s.best_level(), -120.0);

        // A second weak opening does not restart the round.
        assert_eq!(s.squelch_opened(1, -130.0), OpenOutcome::Weaker);
        assert_eq!(s.squelch_opened(2, -110.0), OpenOutcome::NewCandidate);
        assert_eq!(s.choose_best(), Some((2, -110.0)));
        assert_eq!(s.active_rx(), Some(2));
    }

    #[test]
    fn openings_while_active_are_ignored() {
        let mut s = VotingState::new();
        s.squelch_opened(0, 5.0);
        s.choose_best();
        assert_eq!(s.squelch_opened(1, 50.0), OpenOutcome::Ignored);
        assert_eq!(s.active_rx(), Some(0));
        assert_eq!(s.best_rx(), None);
    }

    // ---- closing ------------------------------------------------------------

    #[test]
    fn candidate_close_rescans_open_receivers() {
        let mut s = VotingState::new();
        s.squelch_opened(0, 8.0);
        s.squelch_opened(1, 5.0);
        s.squelch_opened(2, 6.0);

        let outcome = s.squelch_closed(0, &[(1, 5.0), (2, 6.0)]);
        assert_eq!(outcome, CloseOutcome::CandidateClosed { new_best: Some(2) });
        assert_eq!(s.best_level(), 6.0);
    }

    #[test]
    fn rescan_breaks_ties_in_configuration_order() {
        let mut s = VotingState::new();
        s.squelch_opened(2, 9.0);
        let outcome = s.squelch_closed(2, &[(0, 4.0), (1, 4.0)]);
        assert_eq!(outcome, CloseOutcome::CandidateClosed { new_best: Some(0) });
    }

    #[test]
    fn rescan_picks_receivers_below_the_reset_level() {
        let mut s = VotingState::new();
        s.squelch_opened(1, 4.0);
        let outcome = s.squelch_closed(1, &[(0, -140.0), (2, -120.0)]);
        assert_eq!(outcome, CloseOutcome::CandidateClosed { new_best: Some(2) });
        assert_eq!(s.choose_best(), Some((2, -120.0)));
    }

    #[test]
    fn last_candidate_close_leaves_nothing_to_choose() {
        let mut s = VotingState::new();
        s.squelch_opened(0, 5.0);
        assert_eq!(
            s.squelch_closed(0, &[]),
            CloseOutcome::CandidateClosed { new_best: None }
        );
        assert_eq!(s.choose_best(), None);
        assert_eq!(s.active_rx(), None);
    }

    #[test]
    fn non_candidate_close_is_ignored() {
        let mut s = VotingState::new();
        s.squelch_opened(0, 8.0);
        s.squelch_opened(1, 5.0);
        assert_eq!(s.squelch_closed(1, &[(0, 8.0)]), CloseOutcome::Ignored);
        assert_eq!(s.best_rx(), Some(0));
    }

    #[test]
    fn active_close_returns_to_idle() {
        let mut s = VotingState::new();
        s.squelch_opened(1, 5.0);
        s.choose_best();
        assert_eq!(s.squelch_closed(1, &[]), CloseOutcome::ActiveClosed);
        assert_eq!(s, VotingState::default());

        // A new round can start.
        assert_eq!(s.squelch_opened(0, 3.0), OpenOutcome::FirstCandidate);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut s = VotingState::new();
        s.squelch_opened(0, 5.0);
        s.reset();
        assert!(!s.is_voting());
        assert_eq!(s, VotingState::default());
    }
}
