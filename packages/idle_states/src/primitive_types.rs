use std::num::NonZero;

use new_zealand::nz;

/// Identifies a specific processor.
///
/// This matches the numeric identifier used by the platform firmware and operating system
/// tooling. Values are not guaranteed to be sequential/contiguous or to start from zero.
pub type ProcessorId = u32;

/// Position of an idle state in a [`StateTable`][crate::StateTable].
///
/// Index 0 is always the polling state. Larger indexes are deeper states.
pub type StateIndex = usize;

/// Maximum number of idle states a [`StateTable`][crate::StateTable] can hold.
///
/// Discovery that reports more candidates than this is silently capped.
pub const MAX_IDLE_STATES: NonZero<usize> = nz!(8);

/// Lifecycle phase of the host system, as reported by the [`IdleHost`][crate::IdleHost].
///
/// The phases are ordered: comparing two values tells whether the system has progressed
/// past a given point of its startup.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum SystemState {
    /// Early boot. Only the boot processor is running and core services are being set up.
    Booting,

    /// The scheduler is operational but startup has not yet completed.
    Scheduling,

    /// The system is fully up.
    Running,

    /// The system is shutting down, halting or restarting.
    Halting,
}

/// Hardware thread priority applied while a core busy-waits in the polling state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "mirroring the fixed priority levels of the hardware"
)]
pub enum ThreadPriority {
    /// The lowest priority, yielding nearly all shared pipeline resources to sibling threads.
    VeryLow,

    /// Reduced priority.
    Low,

    /// The normal priority a hardware thread runs at when executing regular work.
    Medium,
}
