use bitflags::bitflags;

bitflags! {
    /// Capability bits of an idle state.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct StateFlags: u32 {
        /// The exit latency and target residency of the state are meaningful.
        const TIME_VALID = 0x0000_0001;

        /// Entering the state may stop the local time-keeping interrupt source.
        const TIMER_STOP = 0x0000_0002;
    }
}

impl StateFlags {
    /// Whether the latency and residency numbers of a state with these flags can be used
    /// in timeout calculations.
    ///
    /// A state with neither flag set is treated as having invalid latency data.
    #[must_use]
    pub fn has_valid_timing(self) -> bool {
        self.intersects(Self::TIME_VALID | Self::TIMER_STOP)
    }
}

bitflags! {
    /// Capability bits reported by firmware for one idle state candidate.
    ///
    /// One firmware entry may assert several bits at once. Each recognized bit yields its own
    /// row in the state table.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct FirmwareIdleFlags: u32 {
        /// The platform supports the fast-exit (nap) instruction.
        const FAST_EXIT = 0x0001_0000;

        /// The platform supports the timer-stop (fast sleep) instruction.
        const TIMER_STOP = 0x0002_0000;

        // Firmware defines further bits we do not act on; they must survive parsing.
        const _ = !0;
    }
}

bitflags! {
    /// Contents of the core-local control register that gates which interrupt classes can
    /// wake the core from a sleep state.
    ///
    /// Bits not named here belong to unrelated core configuration and are always preserved.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct WakeControl: u64 {
        /// Mediated external interrupt request. Must be clear while the core sleeps.
        const MEDIATED_EXTERNAL = 0x0000_0800;

        /// Wake on a privileged doorbell.
        const WAKE_PRIVILEGED_DOORBELL = 0x0000_1000;

        /// Wake on the periodic decrementer (timer) interrupt.
        const WAKE_DECREMENTER = 0x0000_2000;

        /// Wake on an external interrupt.
        const WAKE_EXTERNAL = 0x0000_4000;

        /// Wake on a directed hypervisor doorbell.
        const WAKE_HYPERVISOR_DOORBELL = 0x0000_8000;

        /// Wake on a directed privileged doorbell.
        const WAKE_DIRECTED_DOORBELL = 0x0001_0000;

        /// The whole wake-source enable field.
        const WAKE_SOURCES = 0x0001_f000;

        const _ = !0;
    }
}

impl WakeControl {
    /// The register value to use while in deep sleep: only external interrupts wake the core.
    ///
    /// The periodic timer interrupt is excluded and the mediated external request is cleared.
    /// Unrelated bits are carried over unchanged.
    #[must_use]
    pub fn for_deep_sleep(self) -> Self {
        self.difference(Self::MEDIATED_EXTERNAL | Self::WAKE_SOURCES)
            .union(Self::WAKE_EXTERNAL)
    }
}
