use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use foldhash::HashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::{DeviceState, HotplugEvent, IdleDevice, NotifyResult, ProcessorId, StateIndex};

type DeviceMap = HashMap<ProcessorId, Arc<IdleDevice>>;

/// Owns the per-processor idle devices and serializes every change to their enablement.
///
/// Changes happen under a driver-wide pause: while paused, the idle loop entry point refuses to
/// enter any state, so no processor acts on a half-applied reconfiguration. The device map is
/// published as an immutable snapshot that only a [`PauseGuard`] replaces, so reading
/// enablement on the idle path does not take any lock.
///
/// Every mutating method of the controller pauses the driver for its own duration. To apply
/// several changes as one step, call [`pause()`][Self::pause] and use the methods of the
/// returned guard.
pub struct EnablementController {
    state_count: usize,
    devices: ArcSwap<DeviceMap>,
    globally_disabled: Box<[AtomicBool]>,
    pause_lock: Mutex<()>,
    paused: AtomicBool,
}

/// Holds the driver paused and applies enablement changes. Dropping it resumes the driver.
///
/// # Example
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # fn main() {
/// use std::sync::Arc;
///
/// use idle_states::fake::{FakeFirmware, FakeHost};
/// use idle_states::{CatalogBuilder, DeviceState, HotplugEvent, IdleDriver};
///
/// let firmware = FakeFirmware::new().present_processors("0-1");
/// let driver = IdleDriver::initialize(&CatalogBuilder::fake(firmware), Arc::new(FakeHost::new()))
///     .expect("registration succeeds on the fake host");
///
/// {
///     let paused = driver.pause();
///     paused.on_hotplug(1, HotplugEvent::Dead);
///     paused.set_state_disabled_globally(0, true);
/// }
///
/// assert_eq!(driver.device(1).unwrap().state(), DeviceState::Disabled);
/// assert!(driver.controller().is_state_disabled_globally(0));
/// # }
/// # #[cfg(not(feature = "test-util"))]
/// # fn main() {}
/// ```
#[must_use = "the driver resumes as soon as the guard is dropped"]
pub struct PauseGuard<'a> {
    controller: &'a EnablementController,
    _lock: MutexGuard<'a, ()>,
}

impl PauseGuard<'_> {
    /// Creates the idle device of a processor, in the uninitialized state.
    ///
    /// Returns the existing device if the processor is already attached.
    pub fn attach(&self, processor_id: ProcessorId) -> Arc<IdleDevice> {
        let current = self.controller.devices.load();

        if let Some(device) = current.get(&processor_id) {
            return Arc::clone(device);
        }

        let device = Arc::new(IdleDevice::new(processor_id, self.controller.state_count));

        let mut next = (**current).clone();
        next.insert(processor_id, Arc::clone(&device));
        self.controller.devices.store(Arc::new(next));

        trace!(processor_id, "idle device attached");
        device
    }

    /// Destroys the idle device of a processor that was permanently removed.
    ///
    /// Returns `false` if the processor had no device.
    pub fn detach(&self, processor_id: ProcessorId) -> bool {
        let current = self.controller.devices.load();

        let Some(device) = current.get(&processor_id) else {
            return false;
        };

        // Anyone still holding the device sees it disabled.
        device.set_state(DeviceState::Disabled);

        let mut next = (**current).clone();
        next.remove(&processor_id);
        self.controller.devices.store(Arc::new(next));

        trace!(processor_id, "idle device detached");
        true
    }

    /// Allows the processor to enter idle states.
    ///
    /// Returns `false` if the processor has no device.
    pub fn enable(&self, processor_id: ProcessorId) -> bool {
        self.transition(processor_id, DeviceState::Enabled)
    }

    /// Stops the processor from entering idle states.
    ///
    /// Returns `false` if the processor has no device.
    pub fn disable(&self, processor_id: ProcessorId) -> bool {
        self.transition(processor_id, DeviceState::Disabled)
    }

    fn transition(&self, processor_id: ProcessorId, target: DeviceState) -> bool {
        let Some(device) = self.controller.device(processor_id) else {
            return false;
        };

        device.set_state(target);

        trace!(processor_id, state = ?target, "idle device transitioned");
        true
    }

    /// Reacts to a processor lifecycle notification.
    ///
    /// Processors coming online get their device enabled, processors going offline get it
    /// disabled. Other events, and events for processors without a device, are not handled and
    /// change nothing.
    pub fn on_hotplug(&self, processor_id: ProcessorId, event: HotplugEvent) -> NotifyResult {
        let handled = match event {
            HotplugEvent::Online | HotplugEvent::OnlineFrozen => self.enable(processor_id),
            HotplugEvent::Dead | HotplugEvent::DeadFrozen => self.disable(processor_id),
            HotplugEvent::UpPrepare | HotplugEvent::DownPrepare | HotplugEvent::DownFailed => {
                false
            }
        };

        trace!(processor_id, ?event, handled, "hotplug notification");

        if handled {
            NotifyResult::Handled
        } else {
            NotifyResult::NotHandled
        }
    }

    /// Allows or forbids one processor to use the state at `index`.
    ///
    /// Returns `false` if the processor has no device or the index is outside the table.
    pub fn set_state_disabled(
        &self,
        processor_id: ProcessorId,
        index: StateIndex,
        disabled: bool,
    ) -> bool {
        self.controller
            .device(processor_id)
            .is_some_and(|device| device.set_state_disabled(index, disabled))
    }

    /// Allows or forbids every processor to use the state at `index`.
    ///
    /// Returns `false` if the index is outside the table.
    pub fn set_state_disabled_globally(&self, index: StateIndex, disabled: bool) -> bool {
        let Some(flag) = self.controller.globally_disabled.get(index) else {
            return false;
        };

        flag.store(disabled, Ordering::Release);
        true
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.controller.paused.store(false, Ordering::Release);
    }
}

impl fmt::Debug for PauseGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PauseGuard").finish_non_exhaustive()
    }
}

impl EnablementController {
    pub(crate) fn new(state_count: usize) -> Self {
        Self {
            state_count,
            devices: ArcSwap::from_pointee(DeviceMap::default()),
            globally_disabled: (0..state_count).map(|_| AtomicBool::new(false)).collect(),
            pause_lock: Mutex::new(()),
            paused: AtomicBool::new(false),
        }
    }

    /// Pauses the driver until the returned guard is dropped.
    ///
    /// Blocks while another thread holds the driver paused.
    ///
    /// # Deadlocks
    ///
    /// The mutating methods of the controller pause the driver themselves. While holding the
    /// guard, make changes through the guard instead: calling them on the controller from the
    /// same thread never returns.
    pub fn pause(&self) -> PauseGuard<'_> {
        let lock = self.pause_lock.lock();
        self.paused.store(true, Ordering::Release);

        PauseGuard {
            controller: self,
            _lock: lock,
        }
    }

    /// Whether the driver is currently paused.
    #[must_use]
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Creates the idle device of a processor, in the uninitialized state.
    ///
    /// Returns the existing device if the processor is already attached.
    pub fn attach(&self, processor_id: ProcessorId) -> Arc<IdleDevice> {
        self.pause().attach(processor_id)
    }

    /// Destroys the idle device of a processor that was permanently removed.
    ///
    /// Returns `false` if the processor had no device.
    pub fn detach(&self, processor_id: ProcessorId) -> bool {
        self.pause().detach(processor_id)
    }

    /// The idle device of a processor, if one is attached.
    #[must_use]
    pub fn device(&self, processor_id: ProcessorId) -> Option<Arc<IdleDevice>> {
        self.devices.load().get(&processor_id).cloned()
    }

    /// Allows the processor to enter idle states.
    ///
    /// Returns `false` if the processor has no device.
    pub fn enable(&self, processor_id: ProcessorId) -> bool {
        self.pause().enable(processor_id)
    }

    /// Stops the processor from entering idle states.
    ///
    /// Returns `false` if the processor has no device.
    pub fn disable(&self, processor_id: ProcessorId) -> bool {
        self.pause().disable(processor_id)
    }

    /// Reacts to a processor lifecycle notification. See [`PauseGuard::on_hotplug()`].
    pub fn on_hotplug(&self, processor_id: ProcessorId, event: HotplugEvent) -> NotifyResult {
        self.pause().on_hotplug(processor_id, event)
    }

    /// Allows or forbids one processor to use the state at `index`.
    ///
    /// Returns `false` if the processor has no device or the index is outside the table.
    pub fn set_state_disabled(
        &self,
        processor_id: ProcessorId,
        index: StateIndex,
        disabled: bool,
    ) -> bool {
        self.pause()
            .set_state_disabled(processor_id, index, disabled)
    }

    /// Allows or forbids every processor to use the state at `index`.
    ///
    /// Returns `false` if the index is outside the table.
    pub fn set_state_disabled_globally(&self, index: StateIndex, disabled: bool) -> bool {
        self.pause().set_state_disabled_globally(index, disabled)
    }

    /// Whether the state at `index` is disabled for every processor.
    ///
    /// Indexes outside the table are reported as disabled.
    #[must_use]
    pub fn is_state_disabled_globally(&self, index: StateIndex) -> bool {
        self.globally_disabled
            .get(index)
            .is_none_or(|flag| flag.load(Ordering::Acquire))
    }

    /// Whether `device` may not use the state at `index`, for either reason.
    pub(crate) fn is_state_disabled(&self, device: &IdleDevice, index: StateIndex) -> bool {
        self.is_state_disabled_globally(index) || device.is_state_disabled(index)
    }

    /// Number of attached devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.load().len()
    }
}

impl fmt::Debug for EnablementController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnablementController")
            .field("state_count", &self.state_count)
            .field("device_count", &self.device_count())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}
