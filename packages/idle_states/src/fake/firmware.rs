//! Fake firmware data source.

use foldhash::{HashMap, HashSet};

use crate::prober::{
    COMPATIBLE_PROPERTY, FLAGS_PROPERTY, LATENCIES_PROPERTY, OPAL_NODE, OPAL_V3_COMPATIBLE,
    POWER_MGT_NODE,
};
use crate::{Firmware, FirmwareIdleFlags};

/// Firmware that serves data configured in code.
///
/// A new instance describes a platform without the power-management feature and without any
/// idle state data. Builder methods add what the test needs.
///
/// # Example
///
/// ```
/// use idle_states::fake::FakeFirmware;
/// use idle_states::{CatalogBuilder, FirmwareIdleFlags, ProbeError};
///
/// // Platform that advertises power management but lacks the latency property.
/// let firmware = FakeFirmware::new()
///     .power_management(true)
///     .idle_state(FirmwareIdleFlags::FAST_EXIT, 10_000)
///     .remove_property("/ibm,opal/power-mgt", "ibm,cpu-idle-state-latencies-ns");
///
/// let catalog = CatalogBuilder::fake(firmware).build();
///
/// assert_eq!(catalog.table().len(), 1);
/// assert!(matches!(
///     catalog.probe_error(),
///     Some(ProbeError::MissingProperty { .. })
/// ));
/// ```
#[derive(Clone, Debug, Default)]
pub struct FakeFirmware {
    nodes: HashSet<String>,
    properties: HashMap<(String, String), Vec<u8>>,
    present_cpulist: Option<String>,
    possible_cpulist: Option<String>,
    cpuinfo: Option<String>,
}

impl FakeFirmware {
    /// Creates firmware with no data at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises (or stops advertising) the platform power-management feature.
    #[must_use]
    pub fn power_management(self, enabled: bool) -> Self {
        if enabled {
            let mut compatible = OPAL_V3_COMPATIBLE.as_bytes().to_vec();
            compatible.push(0);

            self.property(OPAL_NODE, COMPATIBLE_PROPERTY, compatible)
        } else {
            self.remove_property(OPAL_NODE, COMPATIBLE_PROPERTY)
        }
    }

    /// Appends one idle state entry to the firmware idle state arrays, creating the
    /// power-management node if needed.
    #[must_use]
    pub fn idle_state(mut self, flags: FirmwareIdleFlags, latency_ns: u32) -> Self {
        self.nodes.insert(POWER_MGT_NODE.to_string());

        for (property, value) in [
            (FLAGS_PROPERTY, flags.bits()),
            (LATENCIES_PROPERTY, latency_ns),
        ] {
            self.properties
                .entry((POWER_MGT_NODE.to_string(), property.to_string()))
                .or_default()
                .extend_from_slice(&value.to_be_bytes());
        }

        self
    }

    /// Sets a raw property value, creating the node if needed.
    #[must_use]
    pub fn property(mut self, node_path: &str, property: &str, value: impl Into<Vec<u8>>) -> Self {
        self.nodes.insert(node_path.to_string());
        self.properties.insert(
            (node_path.to_string(), property.to_string()),
            value.into(),
        );
        self
    }

    /// Removes a property. The node itself stays.
    #[must_use]
    pub fn remove_property(mut self, node_path: &str, property: &str) -> Self {
        self.properties
            .remove(&(node_path.to_string(), property.to_string()));
        self
    }

    /// Sets the list of present processors, in cpulist format.
    #[must_use]
    pub fn present_processors(mut self, cpulist: &str) -> Self {
        self.present_cpulist = Some(cpulist.to_string());
        self
    }

    /// Sets the list of possible processors, in cpulist format.
    #[must_use]
    pub fn possible_processors(mut self, cpulist: &str) -> Self {
        self.possible_cpulist = Some(cpulist.to_string());
        self
    }

    /// Reports the frequency of the time base in the processor information text.
    #[must_use]
    pub fn timebase_hz(mut self, hz: u64) -> Self {
        self.cpuinfo = Some(format!("processor\t: 0\ntimebase\t: {hz}\n"));
        self
    }
}

impl Firmware for FakeFirmware {
    fn has_node(&self, node_path: &str) -> bool {
        self.nodes.contains(node_path)
    }

    fn get_property(&self, node_path: &str, property: &str) -> Option<Vec<u8>> {
        self.properties
            .get(&(node_path.to_string(), property.to_string()))
            .cloned()
    }

    fn get_present_cpulist(&self) -> Option<String> {
        self.present_cpulist.clone()
    }

    fn get_possible_cpulist(&self) -> Option<String> {
        self.possible_cpulist.clone()
    }

    fn get_cpuinfo_contents(&self) -> Option<String> {
        self.cpuinfo.clone()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_by_default() {
        let firmware = FakeFirmware::new();

        assert!(!firmware.has_node(POWER_MGT_NODE));
        assert!(firmware.get_property(OPAL_NODE, COMPATIBLE_PROPERTY).is_none());
        assert!(firmware.get_present_cpulist().is_none());
        assert!(firmware.get_possible_cpulist().is_none());
        assert!(firmware.get_cpuinfo_contents().is_none());
    }

    #[test]
    fn idle_states_are_encoded_as_cells() {
        let firmware = FakeFirmware::new()
            .idle_state(FirmwareIdleFlags::FAST_EXIT, 10_000)
            .idle_state(FirmwareIdleFlags::TIMER_STOP, 0x0102_0304);

        assert!(firmware.has_node(POWER_MGT_NODE));
        assert_eq!(
            firmware.get_property(POWER_MGT_NODE, FLAGS_PROPERTY),
            Some(vec![0, 1, 0, 0, 0, 2, 0, 0])
        );
        assert_eq!(
            firmware.get_property(POWER_MGT_NODE, LATENCIES_PROPERTY),
            Some(vec![0, 0, 0x27, 0x10, 1, 2, 3, 4])
        );
    }

    #[test]
    fn power_management_toggles_compatible() {
        let firmware = FakeFirmware::new().power_management(true);
        assert_eq!(
            firmware.get_property(OPAL_NODE, COMPATIBLE_PROPERTY),
            Some(b"ibm,opal-v3\0".to_vec())
        );

        let firmware = firmware.power_management(false);
        assert!(firmware.get_property(OPAL_NODE, COMPATIBLE_PROPERTY).is_none());
        assert!(firmware.has_node(OPAL_NODE));
    }
}
