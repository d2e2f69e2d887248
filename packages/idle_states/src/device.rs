use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::{ProcessorId, StateIndex};

/// Lifecycle state of the idle device of one processor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the device lifecycle has exactly these states"
)]
pub enum DeviceState {
    /// Attached but never enabled.
    Uninitialized,

    /// The processor may enter idle states through this device.
    Enabled,

    /// The processor is offline or otherwise not allowed to use idle states.
    Disabled,
}

impl DeviceState {
    const fn to_raw(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Enabled => 1,
            Self::Disabled => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Enabled,
            2 => Self::Disabled,
            _ => Self::Uninitialized,
        }
    }
}

/// Point-in-time copy of the usage counters of one state on one device.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct StateUsage {
    /// How many times the state was entered.
    pub entries: u64,

    /// Total time spent in the state, in microseconds.
    pub time_us: u64,

    /// How many times entry was requested but declined by the executor.
    pub declined: u64,
}

#[derive(Debug, Default)]
struct StateSlot {
    disabled: AtomicBool,
    entries: AtomicU64,
    time_us: AtomicU64,
    declined: AtomicU64,
}

/// Per-processor idle device: enablement and usage statistics.
///
/// The device is owned by the [`EnablementController`][crate::EnablementController]. Only the
/// controller changes its lifecycle state or per-state `disabled` flags, and always while holding
/// the driver-wide pause. The processor itself updates the usage counters while idling; nothing
/// else writes them, so they never contend.
#[derive(Debug)]
pub struct IdleDevice {
    processor_id: ProcessorId,
    state: AtomicU8,
    poll_time_limit: AtomicBool,
    slots: Box<[StateSlot]>,
}

impl IdleDevice {
    pub(crate) fn new(processor_id: ProcessorId, state_count: usize) -> Self {
        Self {
            processor_id,
            state: AtomicU8::new(DeviceState::Uninitialized.to_raw()),
            poll_time_limit: AtomicBool::new(false),
            slots: (0..state_count).map(|_| StateSlot::default()).collect(),
        }
    }

    /// The processor this device belongs to.
    #[must_use]
    #[inline]
    pub fn processor_id(&self) -> ProcessorId {
        self.processor_id
    }

    /// Current lifecycle state.
    #[must_use]
    #[inline]
    pub fn state(&self) -> DeviceState {
        DeviceState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether this device may not use the state at `index`.
    ///
    /// Indexes outside the table are reported as disabled.
    #[must_use]
    pub fn is_state_disabled(&self, index: StateIndex) -> bool {
        self.slots
            .get(index)
            .is_none_or(|slot| slot.disabled.load(Ordering::Acquire))
    }

    /// Usage counters of the state at `index`.
    #[must_use]
    pub fn usage(&self, index: StateIndex) -> Option<StateUsage> {
        self.slots.get(index).map(|slot| StateUsage {
            entries: slot.entries.load(Ordering::Relaxed),
            time_us: slot.time_us.load(Ordering::Relaxed),
            declined: slot.declined.load(Ordering::Relaxed),
        })
    }

    /// Whether the last exit from the polling state happened because its timeout elapsed
    /// rather than because work arrived.
    #[must_use]
    #[inline]
    pub fn poll_time_limit(&self) -> bool {
        self.poll_time_limit.load(Ordering::Relaxed)
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        self.state.store(state.to_raw(), Ordering::Release);
    }

    /// Returns `false` if `index` is outside the table.
    pub(crate) fn set_state_disabled(&self, index: StateIndex, disabled: bool) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };

        slot.disabled.store(disabled, Ordering::Release);
        true
    }

    pub(crate) fn set_poll_time_limit(&self, hit: bool) {
        self.poll_time_limit.store(hit, Ordering::Relaxed);
    }

    pub(crate) fn record_entry(&self, index: StateIndex, time_us: u64) {
        if let Some(slot) = self.slots.get(index) {
            slot.entries.fetch_add(1, Ordering::Relaxed);
            slot.time_us.fetch_add(time_us, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_declined(&self, index: StateIndex) {
        if let Some(slot) = self.slots.get(index) {
            slot.declined.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(IdleDevice: Send, Sync);

    #[test]
    fn new_device_is_uninitialized_and_all_states_allowed() {
        let device = IdleDevice::new(3, 2);

        assert_eq!(device.processor_id(), 3);
        assert_eq!(device.state(), DeviceState::Uninitialized);
        assert!(!device.is_state_disabled(0));
        assert!(!device.is_state_disabled(1));
        assert!(device.is_state_disabled(2));
        assert_eq!(device.usage(1), Some(StateUsage::default()));
        assert!(device.usage(2).is_none());
        assert!(!device.poll_time_limit());
    }

    #[test]
    fn state_round_trips_through_atomic() {
        let device = IdleDevice::new(0, 1);

        device.set_state(DeviceState::Enabled);
        assert_eq!(device.state(), DeviceState::Enabled);

        device.set_state(DeviceState::Disabled);
        assert_eq!(device.state(), DeviceState::Disabled);
    }

    #[test]
    fn per_state_disable() {
        let device = IdleDevice::new(0, 3);

        assert!(device.set_state_disabled(2, true));
        assert!(device.is_state_disabled(2));
        assert!(!device.is_state_disabled(1));

        assert!(device.set_state_disabled(2, false));
        assert!(!device.is_state_disabled(2));

        assert!(!device.set_state_disabled(3, true));
    }

    #[test]
    fn usage_accumulates() {
        let device = IdleDevice::new(0, 2);

        device.record_entry(1, 40);
        device.record_entry(1, 2);
        device.record_declined(1);
        device.record_entry(5, 1000);

        assert_eq!(
            device.usage(1),
            Some(StateUsage {
                entries: 2,
                time_us: 42,
                declined: 1,
            })
        );
        assert_eq!(device.usage(0), Some(StateUsage::default()));
    }
}
