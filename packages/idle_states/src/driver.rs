use std::sync::Arc;

use tracing::debug;

use crate::executor::Outcome;
use crate::{
    CatalogBuilder, DeviceState, DriverRegistration, EnablementController, EnterError,
    Executor, HotplugEvent, IdleCore, IdleDevice, IdleHost, NotifyResult, PauseGuard, ProbeError,
    ProcessorId, SnoozePolicy, StateIndex, StateTable,
};

/// The registered idle driver: the shared state table plus the per-processor idle devices.
///
/// Obtained from [`IdleDriver::initialize()`], which probes the platform, registers with the
/// host and enables a device for every present processor. Afterwards the host calls
/// [`enter()`][Self::enter] from its idle loop on each processor and forwards processor
/// lifecycle events to [`on_hotplug()`][Self::on_hotplug].
///
/// # Example
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # fn main() {
/// use std::sync::Arc;
///
/// use idle_states::fake::{FakeCore, FakeFirmware, FakeHost};
/// use idle_states::{CatalogBuilder, FirmwareIdleFlags, IdleDriver};
///
/// let firmware = FakeFirmware::new()
///     .power_management(true)
///     .idle_state(FirmwareIdleFlags::FAST_EXIT, 10_000)
///     .present_processors("0-1");
///
/// let driver = IdleDriver::initialize(&CatalogBuilder::fake(firmware), Arc::new(FakeHost::new()))
///     .expect("registration succeeds on the fake host");
///
/// let core = FakeCore::new(1);
/// assert_eq!(driver.enter(&core, 1), Ok(1));
/// assert_eq!(core.naps(), 1);
/// # }
/// # #[cfg(not(feature = "test-util"))]
/// # fn main() {}
/// ```
#[derive(Debug)]
pub struct IdleDriver {
    name: &'static str,
    table: Arc<StateTable>,
    snooze_policy: SnoozePolicy,
    controller: EnablementController,
    host: Arc<dyn IdleHost>,
}

impl IdleDriver {
    /// Probes the platform, builds the state table and registers it with the host.
    ///
    /// Returns `None` if the host turned power-managed idle off or rejected the registration.
    /// Neither is an error from the point of view of the system: the host keeps using its
    /// default idle path. Any other discovery problem still registers a driver, with only the
    /// polling state.
    pub fn initialize(builder: &CatalogBuilder, host: Arc<dyn IdleHost>) -> Option<Arc<Self>> {
        let catalog = builder.build();

        if matches!(catalog.probe_error(), Some(ProbeError::Overridden)) {
            debug!(driver = catalog.driver_name(), "idle driver not registered: disabled by host");
            return None;
        }

        let registration = DriverRegistration::new(
            catalog.driver_name(),
            Arc::clone(catalog.table()),
            catalog.affinity().clone(),
        );

        if let Err(e) = host.register_driver(&registration) {
            debug!(driver = catalog.driver_name(), error = %e, "idle driver registration failed");
            return None;
        }

        let driver = Self {
            name: catalog.driver_name(),
            table: Arc::clone(catalog.table()),
            snooze_policy: *catalog.snooze_policy(),
            controller: EnablementController::new(catalog.table().len()),
            host,
        };

        {
            let paused = driver.controller.pause();

            for &processor_id in catalog.affinity() {
                paused.attach(processor_id);
                paused.enable(processor_id);
            }
        }

        debug!(
            driver = driver.name,
            states = driver.table.len(),
            processors = catalog.affinity().len(),
            "idle driver registered"
        );

        Some(Arc::new(driver))
    }

    /// Enters the idle state at `index` on the calling core and returns once the core is awake
    /// again.
    ///
    /// Returns the index of the state that was entered. If the state executor declined to enter
    /// the state (e.g. deep sleep before the system is fully running), the same index is
    /// returned and no residency is accounted.
    ///
    /// # Errors
    ///
    /// Returns an error without touching the hardware if the driver is paused, the calling
    /// processor has no enabled device, or the state does not exist or is disabled. The host
    /// is expected to fall back to its default idle path.
    ///
    /// The pause is checked once on the way in. An entry that got past the check completes
    /// normally even if the driver is paused while the core is idle.
    pub fn enter<C>(&self, core: &C, index: StateIndex) -> Result<StateIndex, EnterError>
    where
        C: IdleCore + ?Sized,
    {
        if self.controller.is_paused() {
            return Err(EnterError::Paused);
        }

        let processor_id = core.processor_id();

        let device = self
            .controller
            .device(processor_id)
            .ok_or(EnterError::NoDevice(processor_id))?;

        if device.state() != DeviceState::Enabled {
            return Err(EnterError::DeviceNotEnabled(processor_id));
        }

        let executor = self
            .table
            .get(index)
            .and_then(|state| state.executor())
            .ok_or(EnterError::StateOutOfRange(index))?;

        if self.controller.is_state_disabled(&device, index) {
            return Err(EnterError::StateDisabled(index));
        }

        let timeout_ticks = self
            .snooze_policy
            .timeout_ticks(&self.table, index, |i| {
                self.controller.is_state_disabled(&device, i)
            });

        let started = core.time_base();
        let outcome = executor.enter(core, self.host.system_state(), timeout_ticks);
        let elapsed_ticks = core.time_base().saturating_sub(started);

        match outcome {
            Outcome::Completed { timed_out } => {
                device.record_entry(index, self.snooze_policy.ticks_to_usec(elapsed_ticks));

                if executor == Executor::Snooze {
                    device.set_poll_time_limit(timed_out);
                }
            }
            Outcome::Declined => device.record_declined(index),
        }

        Ok(index)
    }

    /// Reacts to a processor lifecycle notification from the host.
    pub fn on_hotplug(&self, processor_id: ProcessorId, event: HotplugEvent) -> NotifyResult {
        self.controller.on_hotplug(processor_id, event)
    }

    /// Creates and enables the idle device of a processor that was hot-added after
    /// registration.
    pub fn attach(&self, processor_id: ProcessorId) -> Arc<IdleDevice> {
        let paused = self.controller.pause();

        let device = paused.attach(processor_id);
        paused.enable(processor_id);
        device
    }

    /// Destroys the idle device of a processor that was permanently removed.
    ///
    /// Returns `false` if the processor had no device.
    pub fn detach(&self, processor_id: ProcessorId) -> bool {
        self.controller.detach(processor_id)
    }

    /// The idle device of a processor, if one is attached.
    #[must_use]
    pub fn device(&self, processor_id: ProcessorId) -> Option<Arc<IdleDevice>> {
        self.controller.device(processor_id)
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
            .set_state_disabled(processor_id, index, disabled)
    }

    /// Allows or forbids every processor to use the state at `index`.
    ///
    /// Returns `false` if the index is outside the table.
    pub fn set_state_disabled_globally(&self, index: StateIndex, disabled: bool) -> bool {
        self.controller.set_state_disabled_globally(index, disabled)
    }

    /// Pauses the driver until the returned guard is dropped. While paused, [`enter()`]
    /// refuses every request.
    ///
    /// Reconfigure the driver through the guard while holding it. The other mutating methods
    /// of the driver pause it themselves and never return if called on the thread that holds
    /// the guard.
    ///
    /// [`enter()`]: Self::enter
    pub fn pause(&self) -> PauseGuard<'_> {
        self.controller.pause()
    }

    /// Name under which the driver is registered.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The idle states of the platform, shared by every processor.
    #[must_use]
    #[inline]
    pub fn table(&self) -> &StateTable {
        &self.table
    }

    /// The snooze timeout policy in effect.
    #[must_use]
    #[inline]
    pub fn snooze_policy(&self) -> &SnoozePolicy {
        &self.snooze_policy
    }

    /// The controller that owns the idle devices.
    #[must_use]
    #[inline]
    pub fn controller(&self) -> &EnablementController {
        &self.controller
    }
}
