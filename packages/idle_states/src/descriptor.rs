use derive_more::Display;

use crate::{Executor, StateFlags};

/// Immutable description of one idle state.
///
/// Descriptors are created by the [`CatalogBuilder`][crate::CatalogBuilder] and are never
/// modified after they are placed in a [`StateTable`][crate::StateTable].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("{name} (exit {exit_latency_us} us, residency {target_residency_us} us)")]
pub struct StateDescriptor {
    name: &'static str,
    desc: &'static str,
    flags: StateFlags,
    exit_latency_us: u32,
    target_residency_us: u32,
    executor: Option<Executor>,
}

impl StateDescriptor {
    /// The built-in polling state that always occupies index 0 of a state table.
    pub(crate) const SNOOZE: Self = Self {
        name: "snooze",
        desc: "snooze",
        flags: StateFlags::TIME_VALID,
        exit_latency_us: 0,
        target_residency_us: 0,
        executor: Some(Executor::Snooze),
    };

    pub(crate) const fn new(
        name: &'static str,
        flags: StateFlags,
        exit_latency_us: u32,
        target_residency_us: u32,
        executor: Option<Executor>,
    ) -> Self {
        Self {
            name,
            desc: name,
            flags,
            exit_latency_us,
            target_residency_us,
            executor,
        }
    }

    /// Short human-readable identifier of the state.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Longer description of the state.
    #[must_use]
    #[inline]
    pub fn desc(&self) -> &'static str {
        self.desc
    }

    /// Capability bits of the state.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    /// Microseconds needed to return to running after a wake event.
    #[must_use]
    #[inline]
    pub fn exit_latency_us(&self) -> u32 {
        self.exit_latency_us
    }

    /// Microseconds the core must stay idle for this state to be worth entering instead of
    /// a shallower one.
    #[must_use]
    #[inline]
    pub fn target_residency_us(&self) -> u32 {
        self.target_residency_us
    }

    /// The executor that enters and exits the state.
    ///
    /// `None` marks a hole: a state a platform variant knows about but cannot enter. Holes
    /// never reach a published [`StateTable`][crate::StateTable].
    #[must_use]
    #[inline]
    pub fn executor(&self) -> Option<Executor> {
        self.executor
    }
}
