//! Resume stabilizer — suppresses downgrade flicker after app-foreground.
//!
//! # Purpose
//!
//! A single foreground/background cycle in rapid succession can produce
//! one spurious "not entitled" reading from the native bridge while the
//! web-view networking stack is still waking up. Requiring *consecutive*
//! negative resume readings before trusting a downgrade eliminates that
//! flicker without masking a genuine cancellation for more than one
//! resume cycle.
//!
//! # Invariants
//!
//! - The streak advances only on a **confirmed negative** resume reading;
//!   an unavailable read never advances it.
//! - Any positive reading resets the streak to zero.
//! - The streak is capped so a long string of negatives cannot require a
//!   matching string of positives to recover.
//! - Pure, no IO: the engine decides when a reading qualifies and feeds
//!   it in.

/// Verdict for one confirmed-negative resume reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakVerdict {
    /// Below the threshold — keep the prior entitled state.
    SuppressDowngrade,
    /// Threshold reached — the negative is trusted.
    AllowDowngrade,
}

/// Consecutive-negative counter consulted on resume-triggered refreshes.
#[derive(Debug, Clone)]
pub struct ResumeStabilizer {
    streak: u8,
    threshold: u8,
    cap: u8,
}

impl ResumeStabilizer {
    /// `threshold` — consecutive negatives required before a downgrade is
    /// trusted (≥ 1). `cap` — upper bound on the counter (≥ threshold).
    pub fn new(threshold: u8, cap: u8) -> Self {
        debug_assert!(threshold >= 1, "threshold must be at least 1");
        debug_assert!(cap >= threshold, "cap must be >= threshold");
        Self {
            streak: 0,
            threshold,
            cap,
        }
    }

    /// Record a confirmed-negative resume reading and judge it.
    pub fn observe_negative(&mut self) -> StreakVerdict {
        self.streak = self.streak.saturating_add(1).min(self.cap);
        if self.streak >= self.threshold {
            StreakVerdict::AllowDowngrade
        } else {
            StreakVerdict::SuppressDowngrade
        }
    }

    /// Record a positive reading: the streak resets.
    pub fn observe_positive(&mut self) {
        self.streak = 0;
    }

    /// Forget everything (sign-out, user switch).
    pub fn reset(&mut self) {
        self.streak = 0;
    }

    pub fn streak(&self) -> u8 {
        self.streak
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_negative_is_suppressed_second_is_trusted() {
        let mut s = ResumeStabilizer::new(2, 3);
        assert_eq!(s.observe_negative(), StreakVerdict::SuppressDowngrade);
        assert_eq!(s.streak(), 1);
        assert_eq!(s.observe_negative(), StreakVerdict::AllowDowngrade);
        assert_eq!(s.streak(), 2);
    }

    #[test]
    fn positive_resets_the_streak() {
        let mut s = ResumeStabilizer::new(2, 3);
        s.observe_negative();
        s.observe_positive();
        assert_eq!(s.streak(), 0);
        // The clock starts over: the next negative is suppressed again.
        assert_eq!(s.observe_negative(), StreakVerdict::SuppressDowngrade);
    }

    #[test]
    fn streak_is_capped() {
        let mut s = ResumeStabilizer::new(2, 3);
        for _ in 0..10 {
            s.observe_negative();
        }
        assert_eq!(s.streak(), 3);
    }

    #[test]
    fn threshold_one_trusts_the_first_negative() {
        let mut s = ResumeStabilizer::new(1, 3);
        assert_eq!(s.observe_negative(), StreakVerdict::AllowDowngrade);
    }

    #[test]
    fn reset_clears_state() {
        let mut s = ResumeStabilizer::new(2, 3);
        s.observe_negative();
        s.reset();
        assert_eq!(s.streak(), 0);
    }
}
