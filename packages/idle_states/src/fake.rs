//! Simulated platforms for testing.
//!
//! Fake firmware, fake per-core hardware and a fake host let tests exercise the whole idle
//! engine (discovery, registration, idle entry and hotplug) without the real platform.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! # Basic usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use idle_states::fake::{FakeCore, FakeFirmware, FakeHost};
//! use idle_states::{CatalogBuilder, FirmwareIdleFlags, IdleDriver};
//!
//! let firmware = FakeFirmware::new()
//!     .power_management(true)
//!     .idle_state(FirmwareIdleFlags::FAST_EXIT | FirmwareIdleFlags::TIMER_STOP, 20_000);
//!
//! let catalog = CatalogBuilder::fake(firmware.clone()).build();
//! assert_eq!(catalog.table().len(), 3);
//!
//! let host = Arc::new(FakeHost::new());
//! let driver = IdleDriver::initialize(&CatalogBuilder::fake(firmware), host.clone()).unwrap();
//! assert_eq!(host.registrations().len(), 1);
//!
//! // Processor 0 is the only one when the firmware does not list any.
//! let core = FakeCore::new(0);
//! assert_eq!(driver.enter(&core, 2), Ok(2));
//! assert_eq!(core.sleeps(), 1);
//! ```
//!
//! # Isolation
//!
//! Every fake is an independent value with no global state, so parallel tests do not
//! interfere with each other.

mod firmware;
mod hardware;
mod host;

pub use firmware::FakeFirmware;
pub use hardware::FakeCore;
pub use host::FakeHost;
