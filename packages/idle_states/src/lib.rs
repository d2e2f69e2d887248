#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A processor core with nothing to run should not burn energy spinning, but every hardware
//! sleep state costs time to wake up from. This package decides which low-power states a core
//! may use and drives the core into them.
//!
//! It covers three concerns:
//!
//! 1. Discovering which idle states the platform firmware supports and turning them into an
//!    ordered, validated [`StateTable`] with exit latency and target residency for each state.
//! 1. Entering a state on the calling core through its executor, with the polling state given
//!    an adaptive timeout so the idle loop gets a chance to pick a deeper state.
//! 1. Keeping per-processor idle devices enabled or disabled as processors come and go.
//!
//! The host operating system stays in charge of the idle loop itself: it decides when a core is
//! idle and which state index to request, and it provides the privileged hardware operations
//! through the [`IdleCore`] and [`IdleHost`] traits.
//!
//! # Quick start
//!
//! ```
//! use idle_states::CatalogBuilder;
//!
//! let catalog = CatalogBuilder::new().build();
//!
//! for state in catalog.table().iter() {
//!     println!("{state}");
//! }
//! ```
//!
//! On a platform without firmware idle state data the table contains only the polling state,
//! named `snooze`.
//!
//! # Registering with the host
//!
//! [`IdleDriver::initialize()`] builds the catalog, hands it to the host and enables an idle
//! device for every present processor. The host then calls [`IdleDriver::enter()`] from its
//! idle loop and forwards processor lifecycle events to [`IdleDriver::on_hotplug()`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use idle_states::{CatalogBuilder, DriverRegistration, IdleDriver, IdleHost};
//! use idle_states::{RegistrationError, SystemState};
//!
//! #[derive(Debug)]
//! struct Kernel;
//!
//! impl IdleHost for Kernel {
//!     fn system_state(&self) -> SystemState {
//!         SystemState::Running
//!     }
//!
//!     fn register_driver(&self, registration: &DriverRegistration) -> Result<(), RegistrationError> {
//!         println!("{} has {} states", registration.name(), registration.table().len());
//!         Ok(())
//!     }
//! }
//!
//! let driver = IdleDriver::initialize(&CatalogBuilder::new(), Arc::new(Kernel));
//! assert!(driver.is_some());
//! ```
//!
//! # Testing with a fake platform
//!
//! The [`fake`] module (behind the `test-util` Cargo feature) provides fake firmware, fake cores
//! and a fake host, so code built on this package can be tested without the real platform.
//!
//! # Logging
//!
//! Discovery problems and registration outcomes are reported through [`tracing`]. The package
//! does not install a subscriber. The idle entry path never logs.
//!
//! # Platform support
//!
//! Firmware data is read from the Linux views of the device tree and processor topology. On
//! other platforms, or Linux systems without the data, the package still works but only ever
//! offers the polling state.

mod catalog_builder;
mod descriptor;
mod device;
mod driver;
mod enablement;
mod error;
mod executor;
mod firmware;
mod flags;
mod host;
mod primitive_types;
mod prober;
mod snooze;
mod table;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use catalog_builder::*;
pub use descriptor::*;
pub use device::*;
pub use driver::*;
pub use enablement::*;
pub use error::*;
pub use executor::Executor;
pub use firmware::{BuildTargetFirmware, Firmware};
pub use flags::*;
pub use host::*;
pub use primitive_types::*;
pub use prober::Candidate;
pub use snooze::*;
pub use table::*;
