use thiserror::Error;

use crate::{ProcessorId, StateIndex};

/// Reasons why firmware discovery produced no idle states beyond the polling state.
///
/// None of these are fatal. The [`CatalogBuilder`][crate::CatalogBuilder] turns every one of
/// them into a polling-only table, logging the cause.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ProbeError {
    /// The host disabled power-managed idle via a boot-time override.
    #[error("idle state driver disabled by host override")]
    Overridden,

    /// The platform does not have the firmware power-management feature.
    #[error("platform firmware does not support power management")]
    Unsupported,

    /// The firmware node that describes idle states does not exist.
    #[error("firmware node '{path}' not found")]
    MissingNode {
        /// Path of the missing node.
        path: &'static str,
    },

    /// A property required to describe idle states is missing from the firmware node.
    #[error("firmware node is missing the '{property}' property")]
    MissingProperty {
        /// Name of the missing property.
        property: &'static str,
    },
}

/// The host idle subsystem refused to accept the idle driver.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum RegistrationError {
    /// The host rejected the driver for a host-specific reason.
    #[error("host rejected idle driver registration: {reason}")]
    Rejected {
        /// A human-readable description of the reason.
        reason: String,
    },

    /// The host ran out of resources needed to track the driver or its devices.
    #[error("host ran out of resources while registering idle driver")]
    ResourceExhausted,
}

/// The idle loop asked for an idle state that cannot be entered right now.
///
/// The caller is expected to fall back to its default idle behavior.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum EnterError {
    /// No idle device is attached for the processor.
    #[error("no idle device attached for processor {0}")]
    NoDevice(ProcessorId),

    /// The idle device of the processor exists but is not enabled.
    #[error("idle device of processor {0} is not enabled")]
    DeviceNotEnabled(ProcessorId),

    /// The driver is paused while devices or states are being reconfigured.
    #[error("idle driver is paused")]
    Paused,

    /// The requested state index is not in the state table.
    #[error("idle state {0} does not exist")]
    StateOutOfRange(StateIndex),

    /// The requested state is disabled globally or for this processor.
    #[error("idle state {0} is disabled")]
    StateDisabled(StateIndex),
}
