use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::job::DelaySource;

/// Exponential backoff for status polling.
///
/// `delay(n) = min(max_delay_ms, round(base_delay_ms * growth_factor^n))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub growth_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1500,
            growth_factor: 1.6,
            max_delay_ms: 15_000,
        }
    }
}

impl BackoffPolicy {
    /// Computed delay for a zero-based attempt index.
    pub fn delay_for_attempt(&self, attempt_index: u32) -> u64 {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let raw = (self.base_delay_ms as f64 * self.growth_factor.powi(exponent)).round();
        if !raw.is_finite() || raw >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else if raw <= 0.0 {
            0
        } else {
            raw as u64
        }
    }

    /// Delay for this attempt only. A server hint wins but leaves the
    /// computed sequence untouched for later attempts.
    pub fn next_delay(&self, attempt_index: u32, hint: Option<Duration>) -> (u64, DelaySource) {
        match hint {
            Some(hint) => (
                u64::try_from(hint.as_millis()).unwrap_or(u64::MAX),
                DelaySource::ServerHint,
            ),
            None => (self.delay_for_attempt(attempt_index), DelaySource::Computed),
        }
    }
}

/// Coarse progress narration shown while polling. Cosmetic only: it is derived
/// from the attempt index, never from the server.
pub fn phase_label(attempt_index: u32) -> &'static str {
    match attempt_index {
        0..=2 => "in transcription",
        3..=5 => "in transcript cleanup",
        6..=9 => "structuring",
        _ => "finalizing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_sequence() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), 1500);
        assert_eq!(policy.delay_for_attempt(1), 2400);
        assert_eq!(policy.delay_for_attempt(2), 3840);
        assert_eq!(policy.delay_for_attempt(3), 6144);
        assert_eq!(policy.delay_for_attempt(4), 9830);
        assert_eq!(policy.delay_for_attempt(5), 15_000);
        assert_eq!(policy.delay_for_attempt(10), 15_000);
    }

    #[test]
    fn huge_attempt_index_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(u32::MAX), 15_000);
    }

    #[test]
    fn hint_overrides_only_its_own_attempt() {
        let policy = BackoffPolicy::default();
        let (delay, source) = policy.next_delay(3, Some(Duration::from_secs(30)));
        assert_eq!(delay, 30_000);
        assert_eq!(source, DelaySource::ServerHint);

        let (delay, source) = policy.next_delay(4, None);
        assert_eq!(delay, 9830);
        assert_eq!(source, DelaySource::Computed);
    }

    #[test]
    fn zero_hint_is_honored() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.next_delay(0, Some(Duration::ZERO)),
            (0, DelaySource::ServerHint)
        );
    }

    #[test]
    fn phase_labels_follow_buckets() {
        assert_eq!(phase_label(0), "in transcription");
        assert_eq!(phase_label(2), "in transcription");
        assert_eq!(phase_label(3), "in transcript cleanup");
        assert_eq!(phase_label(6), "structuring");
        assert_eq!(phase_label(9), "structuring");
        assert_eq!(phase_label(10), "finalizing");
        assert_eq!(phase_label(500), "finalizing");
    }
}
