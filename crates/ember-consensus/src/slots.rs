//! Slot clock

use std::time::Duration;

/// Maps epoch-relative timestamps to slot numbers.
///
/// One slot admits at most one block; callers use equality of slot numbers
/// as the "same round" predicate. The clock also carries the consensus
/// parameters tied to slot timing: the active delegate count, the PoW
/// difficulty width and the mining deadline.
#[derive(Debug, Clone, Copy)]
pub struct SlotClock {
    /// Slot length in seconds
    interval: i32,
    /// Size of the active delegate set
    delegates: u32,
    /// PoW difficulty width in bits
    leading: u8,
    /// Wall-clock budget for mining one proposal
    pow_timeout: Duration,
}

impl SlotClock {
    /// Create a clock with explicit parameters.
    ///
    /// `interval` must be positive and `leading` at least one bit.
    pub fn new(interval: i32, delegates: u32, leading: u8, pow_timeout: Duration) -> Self {
        Self {
            interval: interval.max(1),
            delegates: delegates.max(1),
            leading: leading.max(1),
            pow_timeout,
        }
    }

    /// Slot number a timestamp falls into. Pre-epoch timestamps map to slot 0.
    pub fn slot_of(&self, timestamp: i32) -> u64 {
        if timestamp <= 0 {
            return 0;
        }
        (timestamp / self.interval) as u64
    }

    /// First timestamp of a slot
    pub fn slot_start(&self, slot: u64) -> i32 {
        i64::try_from(slot)
            .ok()
            .and_then(|s| s.checked_mul(self.interval as i64))
            .and_then(|ts| i32::try_from(ts).ok())
            .unwrap_or(i32::MAX)
    }

    /// Whether two timestamps fall into the same slot
    pub fn same_slot(&self, a: i32, b: i32) -> bool {
        self.slot_of(a) == self.slot_of(b)
    }

    /// Slot length in seconds
    pub fn interval(&self) -> i32 {
        self.interval
    }

    /// Size of the active delegate set
    pub fn delegates(&self) -> u32 {
        self.delegates
    }

    /// PoW difficulty width in bits
    pub fn leading(&self) -> u8 {
        self.leading
    }

    /// Wall-clock budget for mining one proposal
    pub fn pow_timeout(&self) -> Duration {
        self.pow_timeout
    }

    /// Vote count that must be strictly exceeded for a block to commit:
    /// `⌊2·delegates/3⌋`.
    pub fn vote_threshold(&self) -> u64 {
        2 * self.delegates as u64 / 3
    }
}

impl Default for SlotClock {
    fn default() -> Self {
        Self {
            interval: 10,
            delegates: 101,
            leading: 2,
            pow_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_of() {
        let clock = SlotClock::default();
        assert_eq!(clock.slot_of(0), 0);
        assert_eq!(clock.slot_of(9), 0);
        assert_eq!(clock.slot_of(10), 1);
        assert_eq!(clock.slot_of(105), 10);
    }

    #[test]
    fn test_slot_of_pre_epoch() {
        let clock = SlotClock::default();
        assert_eq!(clock.slot_of(-1), 0);
        assert_eq!(clock.slot_of(i32::MIN), 0);
    }

    #[test]
    fn test_same_slot() {
        let clock = SlotClock::default();
        assert!(clock.same_slot(10, 19));
        assert!(!clock.same_slot(19, 20));
    }

    #[test]
    fn test_slot_start_round_trip() {
        let clock = SlotClock::default();
        for slot in [0u64, 1, 7, 100_000] {
            assert_eq!(clock.slot_of(clock.slot_start(slot)), slot);
        }
    }

    #[test]
    fn test_slot_start_saturates() {
        let clock = SlotClock::default();
        assert_eq!(clock.slot_start(u64::MAX), i32::MAX);
    }

    #[test]
    fn test_vote_threshold() {
        let clock = SlotClock::new(10, 101, 2, Duration::from_secs(5));
        assert_eq!(clock.vote_threshold(), 67);

        let small = SlotClock::new(10, 3, 2, Duration::from_secs(5));
        assert_eq!(small.vote_threshold(), 2);
    }

    #[test]
    fn test_new_clamps_degenerate_params() {
        let clock = SlotClock::new(0, 0, 0, Duration::ZERO);
        assert_eq!(clock.interval(), 1);
        assert_eq!(clock.delegates(), 1);
        assert_eq!(clock.leading(), 1);
    }
}
