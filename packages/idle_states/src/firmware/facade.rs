use std::fmt::Debug;
use std::sync::Arc;

#[cfg(test)]
use crate::firmware::MockFirmware;
#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakeFirmware;
use crate::{BuildTargetFirmware, Firmware};

/// Enum to hide the different firmware implementations behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum FirmwareFacade {
    Target(&'static BuildTargetFirmware),

    /// Firmware access supplied by the host (e.g. a kernel with its own device tree parser).
    Custom(Arc<dyn Firmware>),

    #[cfg(any(test, feature = "test-util"))]
    Fake(Arc<FakeFirmware>),

    #[cfg(test)]
    Mock(Arc<MockFirmware>),
}

impl FirmwareFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetFirmware)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockFirmware) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Firmware for FirmwareFacade {
    fn has_node(&self, node_path: &str) -> bool {
        match self {
            Self::Target(firmware) => firmware.has_node(node_path),
            Self::Custom(firmware) => firmware.has_node(node_path),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(firmware) => firmware.has_node(node_path),
            #[cfg(test)]
            Self::Mock(mock) => mock.has_node(node_path),
        }
    }

    fn get_property(&self, node_path: &str, property: &str) -> Option<Vec<u8>> {
        match self {
            Self::Target(firmware) => firmware.get_property(node_path, property),
            Self::Custom(firmware) => firmware.get_property(node_path, property),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(firmware) => firmware.get_property(node_path, property),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_property(node_path, property),
        }
    }

    fn get_present_cpulist(&self) -> Option<String> {
        match self {
            Self::Target(firmware) => firmware.get_present_cpulist(),
            Self::Custom(firmware) => firmware.get_present_cpulist(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(firmware) => firmware.get_present_cpulist(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_present_cpulist(),
        }
    }

    fn get_possible_cpulist(&self) -> Option<String> {
        match self {
            Self::Target(firmware) => firmware.get_possible_cpulist(),
            Self::Custom(firmware) => firmware.get_possible_cpulist(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(firmware) => firmware.get_possible_cpulist(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_possible_cpulist(),
        }
    }

    fn get_cpuinfo_contents(&self) -> Option<String> {
        match self {
            Self::Target(firmware) => firmware.get_cpuinfo_contents(),
            Self::Custom(firmware) => firmware.get_cpuinfo_contents(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(firmware) => firmware.get_cpuinfo_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cpuinfo_contents(),
        }
    }
}

impl From<Arc<dyn Firmware>> for FirmwareFacade {
    fn from(firmware: Arc<dyn Firmware>) -> Self {
        Self::Custom(firmware)
    }
}

#[cfg(any(test, feature = "test-util"))]
impl From<FakeFirmware> for FirmwareFacade {
    fn from(firmware: FakeFirmware) -> Self {
        Self::Fake(Arc::new(firmware))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for FirmwareFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            Self::Custom(inner) => inner.fmt(f),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
