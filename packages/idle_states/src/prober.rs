use std::num::NonZero;

use derive_more::Display;
use nonempty::{NonEmpty, nonempty};
use tracing::warn;

use crate::firmware::FirmwareFacade;
use crate::{Firmware, FirmwareIdleFlags, ProbeError, ProcessorId};

/// Firmware node whose `compatible` property announces the power-management feature.
pub(crate) const OPAL_NODE: &str = "/ibm,opal";

/// Firmware node that describes the platform idle states.
pub(crate) const POWER_MGT_NODE: &str = "/ibm,opal/power-mgt";

pub(crate) const COMPATIBLE_PROPERTY: &str = "compatible";
pub(crate) const OPAL_V3_COMPATIBLE: &str = "ibm,opal-v3";

pub(crate) const FLAGS_PROPERTY: &str = "ibm,cpu-idle-state-flags";
pub(crate) const LATENCIES_PROPERTY: &str = "ibm,cpu-idle-state-latencies-ns";

/// Size of one big-endian cell in a firmware array property.
const CELL_SIZE: usize = size_of::<u32>();

const NANOS_PER_MICRO: u32 = 1000;

// The firmware contract defines target residency as 10x the exit latency.
const NANOS_PER_RESIDENCY_MICRO: u32 = 100;

const HZ_PER_MHZ: u64 = 1_000_000;

/// One idle state entry as reported by firmware, before it is turned into table rows.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("{flags:?} @ {latency_ns} ns")]
pub struct Candidate {
    flags: FirmwareIdleFlags,
    latency_ns: u32,
}

impl Candidate {
    /// Creates a candidate from raw firmware values.
    #[must_use]
    pub fn new(flags: FirmwareIdleFlags, latency_ns: u32) -> Self {
        Self { flags, latency_ns }
    }

    /// Capability bits of the entry.
    #[must_use]
    #[inline]
    pub fn flags(&self) -> FirmwareIdleFlags {
        self.flags
    }

    /// Exit latency reported by firmware, in nanoseconds.
    #[must_use]
    #[inline]
    pub fn latency_ns(&self) -> u32 {
        self.latency_ns
    }

    /// Exit latency in microseconds, truncated.
    #[must_use]
    #[inline]
    #[expect(
        clippy::integer_division,
        reason = "truncation is part of the firmware contract"
    )]
    pub fn exit_latency_us(&self) -> u32 {
        self.latency_ns / NANOS_PER_MICRO
    }

    /// Target residency in microseconds, derived as ten times the exit latency (truncated
    /// from nanoseconds, not from the truncated exit latency).
    #[must_use]
    #[inline]
    #[expect(
        clippy::integer_division,
        reason = "truncation is part of the firmware contract"
    )]
    pub fn target_residency_us(&self) -> u32 {
        self.latency_ns / NANOS_PER_RESIDENCY_MICRO
    }
}

/// Reads platform capability data and converts it into idle state candidates.
#[derive(Debug)]
pub(crate) struct CapabilityProber<'a> {
    firmware: &'a FirmwareFacade,
}

impl<'a> CapabilityProber<'a> {
    pub(crate) fn new(firmware: &'a FirmwareFacade) -> Self {
        Self { firmware }
    }

    /// Whether the platform firmware has the power-management feature at all.
    pub(crate) fn has_power_management(&self) -> bool {
        self.firmware
            .get_property(OPAL_NODE, COMPATIBLE_PROPERTY)
            .is_some_and(|compatible| {
                // A list of NUL-terminated strings.
                compatible
                    .split(|b| *b == 0)
                    .any(|entry| entry == OPAL_V3_COMPATIBLE.as_bytes())
            })
    }

    /// Returns the idle state candidates in the order firmware lists them.
    ///
    /// A node that lists zero entries is not an error and yields an empty list.
    pub(crate) fn candidates(&self) -> Result<Vec<Candidate>, ProbeError> {
        if !self.firmware.has_node(POWER_MGT_NODE) {
            return Err(ProbeError::MissingNode {
                path: POWER_MGT_NODE,
            });
        }

        let flags = self
            .firmware
            .get_property(POWER_MGT_NODE, FLAGS_PROPERTY)
            .ok_or(ProbeError::MissingProperty {
                property: FLAGS_PROPERTY,
            })?;

        let latencies = self
            .firmware
            .get_property(POWER_MGT_NODE, LATENCIES_PROPERTY)
            .ok_or(ProbeError::MissingProperty {
                property: LATENCIES_PROPERTY,
            })?;

        let flags = parse_cells(FLAGS_PROPERTY, &flags);
        let latencies = parse_cells(LATENCIES_PROPERTY, &latencies);

        if latencies.len() < flags.len() {
            warn!(
                flags = flags.len(),
                latencies = latencies.len(),
                "{LATENCIES_PROPERTY} has fewer entries than {FLAGS_PROPERTY}; ignoring unpaired entries"
            );
        }

        Ok(flags
            .into_iter()
            .zip(latencies)
            .map(|(flags, latency_ns)| {
                Candidate::new(FirmwareIdleFlags::from_bits_retain(flags), latency_ns)
            })
            .collect())
    }

    /// The processors that have backing hardware.
    ///
    /// Falls back to the possible processors and finally to processor 0 alone if the platform
    /// does not say.
    pub(crate) fn present_processors(&self) -> NonEmpty<ProcessorId> {
        self.firmware
            .get_present_cpulist()
            .and_then(|list| parse_cpulist("present", &list))
            .or_else(|| {
                self.firmware
                    .get_possible_cpulist()
                    .and_then(|list| parse_cpulist("possible", &list))
            })
            .unwrap_or_else(|| nonempty![0])
    }

    /// The time base frequency in ticks per microsecond, if the platform reports one.
    pub(crate) fn timebase_ticks_per_usec(&self) -> Option<NonZero<u64>> {
        let cpuinfo = self.firmware.get_cpuinfo_contents()?;

        let hz = cpuinfo.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;

            if key.trim() == "timebase" {
                value.trim().parse::<u64>().ok()
            } else {
                None
            }
        })?;

        NonZero::new(hz.checked_div(HZ_PER_MHZ)?)
    }
}

/// Decodes an array of big-endian u32 cells. Trailing bytes that do not form a whole cell are
/// ignored.
fn parse_cells(property: &str, bytes: &[u8]) -> Vec<u32> {
    let chunks = bytes.chunks_exact(CELL_SIZE);

    if !chunks.remainder().is_empty() {
        warn!(
            trailing_bytes = chunks.remainder().len(),
            "{property} is not a whole number of cells; ignoring trailing bytes"
        );
    }

    chunks
        .filter_map(|cell| <[u8; CELL_SIZE]>::try_from(cell).ok())
        .map(u32::from_be_bytes)
        .collect()
}

fn parse_cpulist(which: &str, list: &str) -> Option<NonEmpty<ProcessorId>> {
    match cpulist::parse(list.trim()) {
        Ok(processors) => NonEmpty::from_vec(processors),
        Err(e) => {
            warn!(list = which, error = %e, "ignoring unparseable processor list");
            None
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::firmware::MockFirmware;

    fn cells(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn power_mgt_mock(flags: Option<Vec<u8>>, latencies: Option<Vec<u8>>) -> FirmwareFacade {
        let mut firmware = MockFirmware::new();

        firmware
            .expect_has_node()
            .with(eq(POWER_MGT_NODE))
            .return_const(true);

        firmware
            .expect_get_property()
            .with(eq(POWER_MGT_NODE), eq(FLAGS_PROPERTY))
            .return_const(flags);

        firmware
            .expect_get_property()
            .with(eq(POWER_MGT_NODE), eq(LATENCIES_PROPERTY))
            .return_const(latencies);

        FirmwareFacade::from_mock(firmware)
    }

    #[test]
    fn unit_conversion_truncates() {
        let candidate = Candidate::new(FirmwareIdleFlags::FAST_EXIT, 10_999);

        assert_eq!(candidate.exit_latency_us(), 10);
        assert_eq!(candidate.target_residency_us(), 109);

        let candidate = Candidate::new(FirmwareIdleFlags::FAST_EXIT, 999);

        assert_eq!(candidate.exit_latency_us(), 0);
        assert_eq!(candidate.target_residency_us(), 9);
    }

    #[test]
    fn feature_detected_from_compatible_list() {
        let mut firmware = MockFirmware::new();
        firmware
            .expect_get_property()
            .with(eq(OPAL_NODE), eq(COMPATIBLE_PROPERTY))
            .return_const(Some(b"ibm,opal-v2\0ibm,opal-v3\0".to_vec()));
        let firmware = FirmwareFacade::from_mock(firmware);

        assert!(CapabilityProber::new(&firmware).has_power_management());
    }

    #[test]
    fn feature_absent_without_v3() {
        let mut firmware = MockFirmware::new();
        firmware
            .expect_get_property()
            .with(eq(OPAL_NODE), eq(COMPATIBLE_PROPERTY))
            .return_const(Some(b"ibm,opal-v2\0".to_vec()));
        let firmware = FirmwareFacade::from_mock(firmware);

        assert!(!CapabilityProber::new(&firmware).has_power_management());

        let mut firmware = MockFirmware::new();
        firmware.expect_get_property().returning(|_, _| None);
        let firmware = FirmwareFacade::from_mock(firmware);

        assert!(!CapabilityProber::new(&firmware).has_power_management());
    }

    #[test]
    fn missing_node() {
        let mut firmware = MockFirmware::new();
        firmware.expect_has_node().return_const(false);
        let firmware = FirmwareFacade::from_mock(firmware);

        assert_eq!(
            CapabilityProber::new(&firmware).candidates(),
            Err(ProbeError::MissingNode {
                path: POWER_MGT_NODE
            })
        );
    }

    #[test]
    fn missing_flags() {
        let firmware = power_mgt_mock(None, Some(cells(&[1000])));

        assert_eq!(
            CapabilityProber::new(&firmware).candidates(),
            Err(ProbeError::MissingProperty {
                property: FLAGS_PROPERTY
            })
        );
    }

    #[test]
    fn missing_latencies() {
        let firmware = power_mgt_mock(Some(cells(&[0x0001_0000])), None);

        assert_eq!(
            CapabilityProber::new(&firmware).candidates(),
            Err(ProbeError::MissingProperty {
                property: LATENCIES_PROPERTY
            })
        );
    }

    #[test]
    fn candidates_in_firmware_order() {
        let firmware = power_mgt_mock(
            Some(cells(&[0x0002_0000, 0x0001_0000, 0x0003_0000])),
            Some(cells(&[300_000, 10_000, 20_000])),
        );

        let candidates = CapabilityProber::new(&firmware).candidates().unwrap();

        assert_eq!(
            candidates,
            vec![
                Candidate::new(FirmwareIdleFlags::TIMER_STOP, 300_000),
                Candidate::new(FirmwareIdleFlags::FAST_EXIT, 10_000),
                Candidate::new(
                    FirmwareIdleFlags::FAST_EXIT | FirmwareIdleFlags::TIMER_STOP,
                    20_000
                ),
            ]
        );
    }

    #[test]
    fn unpaired_and_partial_cells_are_dropped() {
        let mut latencies = cells(&[10_000]);
        latencies.push(0xFF);

        let firmware = power_mgt_mock(Some(cells(&[0x0001_0000, 0x0002_0000])), Some(latencies));

        let candidates = CapabilityProber::new(&firmware).candidates().unwrap();

        assert_eq!(
            candidates,
            vec![Candidate::new(FirmwareIdleFlags::FAST_EXIT, 10_000)]
        );
    }

    #[test]
    fn empty_arrays_yield_no_candidates() {
        let firmware = power_mgt_mock(Some(Vec::new()), Some(Vec::new()));

        assert!(
            CapabilityProber::new(&firmware)
                .candidates()
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn present_processors_preferred_over_possible() {
        let mut firmware = MockFirmware::new();
        firmware
            .expect_get_present_cpulist()
            .return_const(Some("0-1,4\n".to_string()));
        firmware.expect_get_possible_cpulist().never();
        let firmware = FirmwareFacade::from_mock(firmware);

        assert_eq!(
            CapabilityProber::new(&firmware).present_processors(),
            nonempty![0, 1, 4]
        );
    }

    #[test]
    fn present_processors_fall_back() {
        let mut firmware = MockFirmware::new();
        firmware
            .expect_get_present_cpulist()
            .return_const(Some("garbage".to_string()));
        firmware
            .expect_get_possible_cpulist()
            .return_const(Some("0-7\n".to_string()));
        let firmware = FirmwareFacade::from_mock(firmware);

        assert_eq!(
            CapabilityProber::new(&firmware).present_processors().len(),
            8
        );

        let mut firmware = MockFirmware::new();
        firmware.expect_get_present_cpulist().returning(|| None);
        firmware.expect_get_possible_cpulist().returning(|| None);
        let firmware = FirmwareFacade::from_mock(firmware);

        assert_eq!(
            CapabilityProber::new(&firmware).present_processors(),
            nonempty![0]
        );
    }

    #[test]
    fn timebase_from_cpuinfo() {
        let mut firmware = MockFirmware::new();
        firmware.expect_get_cpuinfo_contents().return_const(Some(
            "processor\t: 0\ncpu\t\t: POWER8E\n\ntimebase\t: 512000000\nplatform\t: PowerNV\n"
                .to_string(),
        ));
        let firmware = FirmwareFacade::from_mock(firmware);

        assert_eq!(
            CapabilityProber::new(&firmware).timebase_ticks_per_usec(),
            NonZero::new(512)
        );
    }

    #[test]
    fn timebase_absent_or_too_slow() {
        let mut firmware = MockFirmware::new();
        firmware
            .expect_get_cpuinfo_contents()
            .return_const(Some("processor\t: 0\n".to_string()));
        let firmware = FirmwareFacade::from_mock(firmware);

        assert!(
            CapabilityProber::new(&firmware)
                .timebase_ticks_per_usec()
                .is_none()
        );

        let mut firmware = MockFirmware::new();
        firmware
            .expect_get_cpuinfo_contents()
            .return_const(Some("timebase : 1000\n".to_string()));
        let firmware = FirmwareFacade::from_mock(firmware);

        assert!(
            CapabilityProber::new(&firmware)
                .timebase_ticks_per_usec()
                .is_none()
        );
    }
}
