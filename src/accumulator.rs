//! Monotonic reconstruction of wrapping 32-bit kernel counters.
//!
//! Many per-task counters (faults, syscalls, messages, context switches) are
//! exported by the kernel as signed 32-bit integers that silently wrap. The
//! [`Accumulator`] turns a stream of such raw observations into a 64-bit total
//! that only ever grows, provided the counter wraps at most once between two
//! observations.

/// Size of one sign half of the 32-bit range (2^31).
const HALF_RANGE: i64 = 1 << 31;

/// Running 64-bit total of a wrapping signed 32-bit counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    total: u64,
    last: i32,
}

impl Accumulator {
    /// Starts accumulating from the first observed raw value.
    ///
    /// A negative first observation means the counter already crossed into the
    /// upper half of its range, so the positive magnitude is reconstructed from
    /// the bit pattern.
    pub fn new(raw: i32) -> Self {
        let total = if raw >= 0 {
            raw as u64
        } else {
            i32::MAX as u64 + (i32::MIN as i64 - raw as i64).unsigned_abs() + 1
        };
        Self { total, last: raw }
    }

    /// Folds a new raw observation into the total.
    pub fn update(&mut self, raw: i32) {
        self.total += step(self.last, raw);
        self.last = raw;
    }

    /// Current monotonic total.
    pub fn value(&self) -> u64 {
        self.total
    }

    /// Last raw value seen.
    pub fn last_raw(&self) -> i32 {
        self.last
    }
}

/// Number of events between two consecutive raw observations.
fn step(last: i32, raw: i32) -> u64 {
    let (last, raw) = (last as i64, raw as i64);
    let delta = match (last >= 0, raw >= 0) {
        (true, true) | (false, false) if raw >= last => raw - last,
        // Same sign but smaller: the counter rolled over within its half range.
        (true, true) | (false, false) => HALF_RANGE - (last - raw),
        (false, true) => raw + (-last),
        (true, false) => ((i32::MIN as i64 - raw).abs() + 1) + (i32::MAX as i64 - last),
    };
    delta as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Tests for Accumulator::new
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_non_negative() {
        assert_eq!(Accumulator::new(0).value(), 0);
        assert_eq!(Accumulator::new(1234).value(), 1234);
        assert_eq!(Accumulator::new(i32::MAX).value(), i32::MAX as u64);
    }

    #[test]
    fn test_new_pre_wrapped() {
        // 0x8000_0000 is 2^31 when read as unsigned
        assert_eq!(Accumulator::new(i32::MIN).value(), 1u64 << 31);
        // 0xFFFF_FFFF is 2^32 - 1
        assert_eq!(Accumulator::new(-1).value(), (1u64 << 32) - 1);
    }

    // -------------------------------------------------------------------------
    // Tests for Accumulator::update
    // -------------------------------------------------------------------------

    #[test]
    fn test_update_plain_increase() {
        let mut acc = Accumulator::new(10);
        acc.update(25);
        assert_eq!(acc.value(), 25);
        acc.update(25);
        assert_eq!(acc.value(), 25);
    }

    #[test]
    fn test_update_crosses_sign_boundary() {
        let mut acc = Accumulator::new(i32::MAX - 5);
        let start = acc.value();

        acc.update(i32::MAX);
        acc.update(i32::MIN + 2);
        acc.update(i32::MIN + 8);

        // 5 steps up to MAX, 3 across the boundary, 6 more
        assert_eq!(acc.value() - start, 14);
        assert_eq!(acc.last_raw(), i32::MIN + 8);
    }

    #[test]
    fn test_update_full_wrap_to_zero() {
        let mut acc = Accumulator::new(-3);
        let start = acc.value();
        acc.update(4);
        assert_eq!(acc.value() - start, 7);
        assert_eq!(acc.value(), (1u64 << 32) + 4);
    }

    #[test]
    fn test_update_both_negative() {
        let mut acc = Accumulator::new(i32::MIN + 100);
        let start = acc.value();
        acc.update(i32::MIN + 150);
        assert_eq!(acc.value() - start, 50);
    }

    #[test]
    fn test_update_rollover_within_positive_half() {
        let mut acc = Accumulator::new(i32::MAX - 5);
        let start = acc.value();
        acc.update(6);
        assert_eq!(acc.value() - start, 12);
    }

    #[test]
    fn test_monotonic_over_wrapping_sequence() {
        let mut true_count: u64 = (1u64 << 32) - 1_000;
        let mut acc = Accumulator::new(true_count as u32 as i32);
        let mut previous = acc.value();

        for step in [0u64, 1, 7, 300, 999, 1, 65_536, 1 << 30, 12, (1 << 31) - 1] {
            true_count += step;
            acc.update(true_count as u32 as i32);
            assert!(acc.value() >= previous, "value went backwards at step {}", step);
            previous = acc.value();
        }

        assert_eq!(acc.value(), true_count);
    }
}
