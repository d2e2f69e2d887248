use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Firmware;

/// Root of the flattened firmware device tree as exposed by Linux.
const DEVICE_TREE_ROOT: &str = "/proc/device-tree";

/// Firmware data of the real platform that the build is targeting.
///
/// Linux exposes the firmware device tree as a directory hierarchy (one directory per node, one
/// file per property) and the processor topology as small text files, so all of this is plain
/// file reads.
///
/// On platforms that do not expose these files every lookup returns `None`, which leads to a
/// polling-only state table.
#[derive(Debug, Default)]
pub struct BuildTargetFirmware;

impl BuildTargetFirmware {
    fn node_dir(node_path: &str) -> PathBuf {
        Path::new(DEVICE_TREE_ROOT).join(node_path.trim_start_matches('/'))
    }
}

// Real firmware reads are excluded from coverage measurement because the device tree only
// exists on the target platform.
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg_attr(test, mutants::skip)] // Results depend on the machine running the tests.
impl Firmware for BuildTargetFirmware {
    fn has_node(&self, node_path: &str) -> bool {
        Self::node_dir(node_path).is_dir()
    }

    fn get_property(&self, node_path: &str, property: &str) -> Option<Vec<u8>> {
        fs::read(Self::node_dir(node_path).join(property)).ok()
    }

    fn get_present_cpulist(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/system/cpu/present").ok()
    }

    fn get_possible_cpulist(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/system/cpu/possible").ok()
    }

    fn get_cpuinfo_contents(&self) -> Option<String> {
        fs::read_to_string("/proc/cpuinfo").ok()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn node_paths_are_rooted_in_device_tree() {
        assert_eq!(
            BuildTargetFirmware::node_dir("/ibm,opal/power-mgt"),
            Path::new("/proc/device-tree/ibm,opal/power-mgt")
        );
        assert_eq!(
            BuildTargetFirmware::node_dir("ibm,opal"),
            Path::new("/proc/device-tree/ibm,opal")
        );
    }

    #[test]
    #[cfg_attr(miri, ignore)] // Miri cannot touch the real filesystem.
    fn missing_node_is_not_an_error() {
        let firmware = BuildTargetFirmware;

        assert!(!firmware.has_node("/no such node/really"));
        assert!(
            firmware
                .get_property("/no such node/really", "compatible")
                .is_none()
        );
    }
}
