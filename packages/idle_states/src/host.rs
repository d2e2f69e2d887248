//! Interfaces between the idle engine and the host operating system.
//!
//! The host owns the idle loop, the processor lifecycle and the privileged instructions. It
//! implements [`IdleCore`] for the calling core and [`IdleHost`] for system-wide services; the
//! engine only ever talks to the hardware through these.

use std::fmt::Debug;
use std::sync::Arc;

use nonempty::NonEmpty;

use crate::{ProcessorId, RegistrationError, StateTable, SystemState, ThreadPriority, WakeControl};

/// Operations on the processor core that is currently executing the idle loop.
///
/// Every method acts on the calling core only. Nothing here is shared between cores, so no
/// synchronization is needed beyond what the hardware itself provides.
#[cfg_attr(test, mockall::automock)]
pub trait IdleCore {
    /// The processor this core is.
    fn processor_id(&self) -> ProcessorId;

    /// Current value of the monotonic time base, in ticks.
    fn time_base(&self) -> u64;

    /// Whether the scheduler has work for this core.
    fn need_resched(&self) -> bool;

    /// Sets or clears the flag that tells wake sources this core is polling and will notice
    /// new work without an interrupt.
    fn set_polling(&self, polling: bool);

    /// Sets or clears the run latch that marks the core as contributing to load accounting.
    fn set_run_latch(&self, running: bool);

    /// Changes the priority of the hardware thread.
    fn set_thread_priority(&self, priority: ThreadPriority);

    /// Allows interrupts to be delivered to this core.
    fn enable_local_interrupts(&self);

    /// Reads the wake-source control register.
    fn wake_control(&self) -> WakeControl;

    /// Writes the wake-source control register.
    fn set_wake_control(&self, value: WakeControl);

    /// Suspends instruction execution in the fast-exit (nap) state until a wake event.
    fn nap(&self);

    /// Suspends instruction execution in the timer-stop (fast sleep) state until a wake event.
    fn sleep(&self);
}

/// System-wide services the host idle subsystem provides to the engine.
#[cfg_attr(test, mockall::automock)]
pub trait IdleHost: Debug + Send + Sync + 'static {
    /// The current lifecycle phase of the system.
    fn system_state(&self) -> SystemState;

    /// Hands the completed state table and its processor affinity to the host idle subsystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot accept the driver. This disables power-managed
    /// idle for the rest of the boot.
    fn register_driver(&self, registration: &DriverRegistration) -> Result<(), RegistrationError>;
}

/// Everything the host idle subsystem needs to know about a driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverRegistration {
    name: &'static str,
    table: Arc<StateTable>,
    affinity: NonEmpty<ProcessorId>,
}

impl DriverRegistration {
    pub(crate) fn new(
        name: &'static str,
        table: Arc<StateTable>,
        affinity: NonEmpty<ProcessorId>,
    ) -> Self {
        Self {
            name,
            table,
            affinity,
        }
    }

    /// Name of the driver.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The idle states the driver can enter.
    #[must_use]
    #[inline]
    pub fn table(&self) -> &StateTable {
        &self.table
    }

    /// The processors the driver serves: only those that are present on the platform.
    #[must_use]
    #[inline]
    pub fn affinity(&self) -> &NonEmpty<ProcessorId> {
        &self.affinity
    }
}

/// Processor lifecycle notification delivered by the host.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum HotplugEvent {
    /// The processor is about to be brought up.
    UpPrepare,

    /// The processor came online.
    Online,

    /// The processor came online while resuming from suspend.
    OnlineFrozen,

    /// The processor is about to go down.
    DownPrepare,

    /// Taking the processor down failed; it stays online.
    DownFailed,

    /// The processor went offline.
    Dead,

    /// The processor went offline while entering suspend.
    DeadFrozen,
}

/// Whether a hotplug notification was acted upon.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_enums, reason = "a notification is either handled or not")]
pub enum NotifyResult {
    /// The engine reacted to the event.
    Handled,

    /// The event is not relevant to the engine or there is no device for the processor.
    NotHandled,
}
