use std::num::NonZero;

use crate::{StateIndex, StateTable};

/// Decides how long the polling state may spin before the idle loop re-evaluates.
///
/// The polling state is cheap to exit but wastes energy. If a deeper state is usable, the
/// processor should only poll for as long as that state would need to pay off, then give the
/// idle loop a chance to pick the deeper state instead.
///
/// All durations are expressed in time base ticks so that poll deadlines compare directly
/// against [`IdleCore::time_base()`][crate::IdleCore::time_base].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SnoozePolicy {
    default_timeout_ticks: u64,
    adaptive: bool,
    timebase_ticks_per_usec: NonZero<u64>,
}

impl SnoozePolicy {
    /// Creates the policy for a table.
    ///
    /// The default timeout is one scheduler tick. Adaptive timeouts are only enabled if the table
    /// has anything deeper than the polling state.
    pub(crate) fn new(
        table: &StateTable,
        tick_usec: NonZero<u64>,
        timebase_ticks_per_usec: NonZero<u64>,
    ) -> Self {
        Self {
            default_timeout_ticks: tick_usec.get().saturating_mul(timebase_ticks_per_usec.get()),
            adaptive: table.has_deeper_states(),
            timebase_ticks_per_usec,
        }
    }

    /// The timeout used when no deeper state is usable, in time base ticks.
    #[must_use]
    #[inline]
    pub fn default_timeout_ticks(&self) -> u64 {
        self.default_timeout_ticks
    }

    /// Whether the timeout adapts to the deeper states in the table.
    #[must_use]
    #[inline]
    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Time base ticks per microsecond used for all conversions.
    #[must_use]
    #[inline]
    pub fn timebase_ticks_per_usec(&self) -> NonZero<u64> {
        self.timebase_ticks_per_usec
    }

    /// Converts a time base interval to whole microseconds.
    #[must_use]
    #[inline]
    #[expect(
        clippy::integer_division,
        reason = "usage statistics are kept in whole microseconds"
    )]
    pub fn ticks_to_usec(&self, ticks: u64) -> u64 {
        ticks / self.timebase_ticks_per_usec
    }

    /// How long to poll in state `index`, in time base ticks.
    ///
    /// Returns the target residency of the first state after `index` that `is_disabled` does not
    /// reject and whose timing data is valid. Deeper states beyond that one are not considered.
    /// Falls back to the default timeout if there is no such state or adaptive timeouts are off.
    pub fn timeout_ticks(
        &self,
        table: &StateTable,
        index: StateIndex,
        is_disabled: impl Fn(StateIndex) -> bool,
    ) -> u64 {
        if !self.adaptive {
            return self.default_timeout_ticks;
        }

        table
            .iter()
            .enumerate()
            .skip(index.saturating_add(1))
            .find(|(i, state)| !is_disabled(*i) && state.flags().has_valid_timing())
            .map_or(self.default_timeout_ticks, |(_, state)| {
                u64::from(state.target_residency_us())
                    .saturating_mul(self.timebase_ticks_per_usec.get())
            })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;
    use crate::{Executor, StateDescriptor, StateFlags};

    fn nap(residency: u32) -> StateDescriptor {
        StateDescriptor::new("Nap", StateFlags::TIME_VALID, 1, residency, Some(Executor::Nap))
    }

    fn three_state_table() -> StateTable {
        StateTable::new(vec![
            nap(100),
            StateDescriptor::new(
                "FastSleep",
                StateFlags::TIME_VALID | StateFlags::TIMER_STOP,
                300,
                3000,
                Some(Executor::FastSleep),
            ),
        ])
    }

    #[test]
    fn polling_only_table_uses_default() {
        let table = StateTable::polling_only();
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(512));

        assert!(!policy.is_adaptive());
        assert_eq!(policy.default_timeout_ticks(), 5_120_000);
        assert_eq!(policy.timeout_ticks(&table, 0, |_| false), 5_120_000);
    }

    #[test]
    fn ticks_convert_to_whole_microseconds() {
        let policy = SnoozePolicy::new(&StateTable::polling_only(), nz!(10_000), nz!(512));

        assert_eq!(policy.ticks_to_usec(0), 0);
        assert_eq!(policy.ticks_to_usec(511), 0);
        assert_eq!(policy.ticks_to_usec(1024), 2);
    }

    #[test]
    fn nearest_enabled_state_wins() {
        let table = three_state_table();
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(512));

        assert!(policy.is_adaptive());
        assert_eq!(policy.timeout_ticks(&table, 0, |_| false), 100 * 512);
    }

    #[test]
    fn disabled_states_are_skipped() {
        let table = three_state_table();
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(512));

        assert_eq!(policy.timeout_ticks(&table, 0, |i| i == 1), 3000 * 512);
    }

    #[test]
    fn all_deeper_disabled_uses_default() {
        let table = three_state_table();
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(512));

        assert_eq!(
            policy.timeout_ticks(&table, 0, |i| i > 0),
            policy.default_timeout_ticks()
        );
    }

    #[test]
    fn only_states_after_index_count() {
        let table = three_state_table();
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(512));

        assert_eq!(policy.timeout_ticks(&table, 1, |_| false), 3000 * 512);
        assert_eq!(
            policy.timeout_ticks(&table, 2, |_| false),
            policy.default_timeout_ticks()
        );
    }

    #[test]
    fn states_without_valid_timing_are_skipped() {
        let table = StateTable::new(vec![
            StateDescriptor::new("Odd", StateFlags::empty(), 1, 5, Some(Executor::Nap)),
            nap(200),
        ]);
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(1));

        assert_eq!(policy.timeout_ticks(&table, 0, |_| false), 200);
    }

    #[test]
    fn never_returns_residency_of_disabled_state() {
        let table = three_state_table();
        let policy = SnoozePolicy::new(&table, nz!(10_000), nz!(512));

        for mask in 0_u8..4 {
            let is_disabled = |i: StateIndex| i > 0 && mask & (1 << (i - 1)) != 0;

            let timeout = policy.timeout_ticks(&table, 0, is_disabled);

            for (i, state) in table.iter().enumerate().skip(1) {
                if is_disabled(i) {
                    assert_ne!(
                        timeout,
                        u64::from(state.target_residency_us()) * 512,
                        "mask {mask:#b} returned residency of disabled state {i}"
                    );
                }
            }
        }
    }
}
