use std::num::NonZero;
use std::sync::Arc;

use new_zealand::nz;
use nonempty::NonEmpty;
use tracing::{debug, warn};

use crate::firmware::FirmwareFacade;
use crate::prober::CapabilityProber;
use crate::{
    Candidate, Executor, Firmware, FirmwareIdleFlags, MAX_IDLE_STATES, ProbeError, ProcessorId,
    SnoozePolicy, StateDescriptor, StateFlags, StateTable,
};

/// Default name under which the driver registers with the host.
pub const DEFAULT_DRIVER_NAME: &str = "powernv_idle";

/// Default scheduler tick length (HZ=100).
const DEFAULT_TICK_USEC: NonZero<u64> = nz!(10_000);

/// Time base rate assumed when the platform does not report one (512 MHz).
const DEFAULT_TIMEBASE_TICKS_PER_USEC: NonZero<u64> = nz!(512);

/// Assembles the idle state table of the platform, along with everything else needed to run
/// the idle engine on it.
///
/// The table always starts with the built-in polling state, followed by the states discovered
/// from firmware in discovery order. Discovery problems never fail the build; they yield a
/// polling-only table and are reported via [`Catalog::probe_error()`].
///
/// # Example
///
/// ```
/// use idle_states::CatalogBuilder;
///
/// let catalog = CatalogBuilder::new().build();
///
/// // The polling state is always there, whatever the platform.
/// assert_eq!(catalog.table().polling_state().name(), "snooze");
/// ```
#[derive(Clone, Debug)]
pub struct CatalogBuilder {
    firmware: FirmwareFacade,
    override_disabled: bool,
    max_states: NonZero<usize>,
    tick_usec: NonZero<u64>,
    timebase_ticks_per_usec: Option<NonZero<u64>>,
    driver_name: &'static str,
    omitted_executors: Vec<Executor>,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    /// Creates a builder that discovers idle states from the firmware of the build target.
    #[must_use]
    pub fn new() -> Self {
        Self::from_facade(FirmwareFacade::target())
    }

    /// Creates a builder that discovers idle states from host-supplied firmware access.
    #[must_use]
    pub fn with_firmware(firmware: Arc<dyn Firmware>) -> Self {
        Self::from_facade(firmware.into())
    }

    /// Creates a builder that discovers idle states from fake firmware.
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn fake(firmware: crate::fake::FakeFirmware) -> Self {
        Self::from_facade(firmware.into())
    }

    pub(crate) fn from_facade(firmware: FirmwareFacade) -> Self {
        Self {
            firmware,
            override_disabled: false,
            max_states: MAX_IDLE_STATES,
            tick_usec: DEFAULT_TICK_USEC,
            timebase_ticks_per_usec: None,
            driver_name: DEFAULT_DRIVER_NAME,
            omitted_executors: Vec::new(),
        }
    }

    /// Turns power-managed idle off, as requested by a host boot-time override.
    ///
    /// The resulting catalog has only the polling state.
    #[must_use]
    pub fn override_disabled(mut self, disabled: bool) -> Self {
        self.override_disabled = disabled;
        self
    }

    /// Limits the number of states in the table, including the polling state.
    ///
    /// Values above [`MAX_IDLE_STATES`] are clamped to it.
    #[must_use]
    pub fn max_states(mut self, max_states: NonZero<usize>) -> Self {
        self.max_states = max_states.min(MAX_IDLE_STATES);
        self
    }

    /// Length of a host scheduler tick in microseconds. The polling state uses one tick as its
    /// timeout when it has no deeper state to yield to.
    #[must_use]
    pub fn tick_usec(mut self, tick_usec: NonZero<u64>) -> Self {
        self.tick_usec = tick_usec;
        self
    }

    /// Overrides the time base rate instead of reading it from the platform.
    #[must_use]
    pub fn timebase_ticks_per_usec(mut self, ticks: NonZero<u64>) -> Self {
        self.timebase_ticks_per_usec = Some(ticks);
        self
    }

    /// Name under which the driver registers with the host.
    #[must_use]
    pub fn driver_name(mut self, name: &'static str) -> Self {
        self.driver_name = name;
        self
    }

    /// Declares that this platform variant cannot run `executor`. States that would use it
    /// still take up room in the working table but are left out of the final table.
    #[must_use]
    pub fn without_executor(mut self, executor: Executor) -> Self {
        if !self.omitted_executors.contains(&executor) {
            self.omitted_executors.push(executor);
        }
        self
    }

    /// Probes the platform and builds the catalog.
    ///
    /// Building twice from the same firmware data yields identical catalogs.
    #[must_use]
    pub fn build(&self) -> Catalog {
        let prober = CapabilityProber::new(&self.firmware);

        let (table, probe_error) = match self.discover(&prober) {
            Ok(candidates) => (self.assemble(&candidates), None),
            Err(e) => {
                match e {
                    ProbeError::Overridden | ProbeError::Unsupported => {
                        debug!(error = %e, "power-managed idle not available");
                    }
                    _ => {
                        warn!(error = %e, "idle state discovery failed; using polling state only");
                    }
                }

                (StateTable::polling_only(), Some(e))
            }
        };

        let timebase_ticks_per_usec = self
            .timebase_ticks_per_usec
            .or_else(|| prober.timebase_ticks_per_usec())
            .unwrap_or(DEFAULT_TIMEBASE_TICKS_PER_USEC);

        let snooze_policy = SnoozePolicy::new(&table, self.tick_usec, timebase_ticks_per_usec);

        let affinity = prober.present_processors();

        debug!(
            states = table.len(),
            processors = affinity.len(),
            adaptive_snooze = snooze_policy.is_adaptive(),
            "idle state catalog built"
        );

        Catalog {
            driver_name: self.driver_name,
            table: Arc::new(table),
            affinity,
            snooze_policy,
            probe_error,
        }
    }

    fn discover(&self, prober: &CapabilityProber<'_>) -> Result<Vec<Candidate>, ProbeError> {
        if self.override_disabled {
            return Err(ProbeError::Overridden);
        }

        if !prober.has_power_management() {
            return Err(ProbeError::Unsupported);
        }

        prober.candidates()
    }

    fn assemble(&self, candidates: &[Candidate]) -> StateTable {
        // The polling state takes the first slot.
        let capacity = self.max_states.get().saturating_sub(1);

        let rows = candidates
            .iter()
            .flat_map(|candidate| self.rows_for(candidate))
            .collect::<Vec<_>>();

        if rows.len() > capacity {
            warn!(
                discovered = rows.len(),
                capacity,
                "firmware reports more idle states than the table can hold; extra states ignored"
            );
        }

        let deeper_states = rows
            .into_iter()
            .take(capacity)
            .filter(|state| state.executor().is_some())
            .collect();

        StateTable::new(deeper_states)
    }

    /// Table rows for one candidate: fast-exit first, then timer-stop.
    fn rows_for(&self, candidate: &Candidate) -> impl Iterator<Item = StateDescriptor> {
        let exit_latency_us = candidate.exit_latency_us();
        let target_residency_us = candidate.target_residency_us();

        let nap = candidate
            .flags()
            .contains(FirmwareIdleFlags::FAST_EXIT)
            .then(|| {
                StateDescriptor::new(
                    "Nap",
                    StateFlags::TIME_VALID,
                    exit_latency_us,
                    target_residency_us,
                    self.executor_if_available(Executor::Nap),
                )
            });

        let fast_sleep = candidate
            .flags()
            .contains(FirmwareIdleFlags::TIMER_STOP)
            .then(|| {
                StateDescriptor::new(
                    "FastSleep",
                    StateFlags::TIME_VALID | StateFlags::TIMER_STOP,
                    exit_latency_us,
                    target_residency_us,
                    self.executor_if_available(Executor::FastSleep),
                )
            });

        nap.into_iter().chain(fast_sleep)
    }

    fn executor_if_available(&self, executor: Executor) -> Option<Executor> {
        (!self.omitted_executors.contains(&executor)).then_some(executor)
    }
}

/// The result of building: the state table plus everything derived alongside it.
///
/// The table is shared by reference with every processor and is never modified.
#[derive(Clone, Debug)]
pub struct Catalog {
    driver_name: &'static str,
    table: Arc<StateTable>,
    affinity: NonEmpty<ProcessorId>,
    snooze_policy: SnoozePolicy,
    probe_error: Option<ProbeError>,
}

impl Catalog {
    /// The idle states of the platform.
    #[must_use]
    #[inline]
    pub fn table(&self) -> &Arc<StateTable> {
        &self.table
    }

    /// The processors the table is valid for: those present on the platform, which may be
    /// fewer than all possible processors.
    #[must_use]
    #[inline]
    pub fn affinity(&self) -> &NonEmpty<ProcessorId> {
        &self.affinity
    }

    /// The snooze timeout policy derived from the table.
    #[must_use]
    #[inline]
    pub fn snooze_policy(&self) -> &SnoozePolicy {
        &self.snooze_policy
    }

    /// Why discovery did not contribute any states, if it did not.
    ///
    /// When this is `Some`, the table contains only the polling state and the caller should
    /// consider multi-state idle support disabled.
    #[must_use]
    #[inline]
    pub fn probe_error(&self) -> Option<&ProbeError> {
        self.probe_error.as_ref()
    }

    /// Name under which the driver registers with the host.
    #[must_use]
    #[inline]
    pub fn driver_name(&self) -> &'static str {
        self.driver_name
    }
}
