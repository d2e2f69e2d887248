//! Fake host idle subsystem.

use parking_lot::Mutex;

use crate::{DriverRegistration, IdleHost, RegistrationError, SystemState};

/// A host that accepts (or rejects) driver registrations and reports a settable system state.
///
/// The system is fully running unless configured otherwise.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use idle_states::fake::{FakeFirmware, FakeHost};
/// use idle_states::{CatalogBuilder, IdleDriver, RegistrationError};
///
/// let host = Arc::new(FakeHost::new().rejecting(RegistrationError::ResourceExhausted));
///
/// let driver = IdleDriver::initialize(&CatalogBuilder::fake(FakeFirmware::new()), host.clone());
///
/// assert!(driver.is_none());
/// assert!(host.registrations().is_empty());
/// ```
#[derive(Debug)]
pub struct FakeHost {
    system_state: Mutex<SystemState>,
    rejection: Option<RegistrationError>,
    registrations: Mutex<Vec<DriverRegistration>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// Creates a host of a fully running system that accepts every registration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system_state: Mutex::new(SystemState::Running),
            rejection: None,
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Starts the host in the given system state.
    #[must_use]
    pub fn with_system_state(self, state: SystemState) -> Self {
        *self.system_state.lock() = state;
        self
    }

    /// Makes every registration fail with `error`.
    #[must_use]
    pub fn rejecting(mut self, error: RegistrationError) -> Self {
        self.rejection = Some(error);
        self
    }

    /// Moves the system to another lifecycle phase.
    pub fn set_system_state(&self, state: SystemState) {
        *self.system_state.lock() = state;
    }

    /// The registrations the host accepted, oldest first.
    #[must_use]
    pub fn registrations(&self) -> Vec<DriverRegistration> {
        self.registrations.lock().clone()
    }
}

impl IdleHost for FakeHost {
    fn system_state(&self) -> SystemState {
        *self.system_state.lock()
    }

    fn register_driver(&self, registration: &DriverRegistration) -> Result<(), RegistrationError> {
        if let Some(error) = &self.rejection {
            return Err(error.clone());
        }

        self.registrations.lock().push(registration.clone());
        Ok(())
    }
}
