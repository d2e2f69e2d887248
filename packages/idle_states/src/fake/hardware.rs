//! Fake per-core hardware.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{IdleCore, ProcessorId, ThreadPriority, WakeControl};

/// A simulated processor core that records what the idle engine does to it.
///
/// Time is simulated: every read of the time base advances it by a fixed number of ticks and
/// every hardware sleep advances it further, so residency accounting is deterministic.
///
/// By default the scheduler has work as soon as the core polls for it, which makes the polling
/// state return immediately. Use [`work_after_polls()`][Self::work_after_polls] or
/// [`no_work()`][Self::no_work] to keep the core idle for longer.
///
/// # Example
///
/// ```
/// use idle_states::IdleCore;
/// use idle_states::fake::FakeCore;
///
/// let core = FakeCore::new(3).ticks_per_read(10);
///
/// assert_eq!(core.processor_id(), 3);
/// assert_eq!(core.time_base(), 0);
/// assert_eq!(core.time_base(), 10);
/// ```
#[derive(Debug)]
pub struct FakeCore {
    processor_id: ProcessorId,
    ticks_per_read: u64,
    hardware_idle_ticks: u64,
    work_after_polls: Option<u64>,

    time_base: AtomicU64,
    polls: AtomicU64,
    polling: AtomicBool,
    run_latch: AtomicBool,
    interrupts_enabled: AtomicBool,
    thread_priority: Mutex<ThreadPriority>,
    wake_control: AtomicU64,
    wake_control_writes: AtomicU64,
    naps: AtomicU64,
    sleeps: AtomicU64,
}

impl FakeCore {
    /// Creates a running core with all wake sources enabled.
    #[must_use]
    pub fn new(processor_id: ProcessorId) -> Self {
        let wake_control = WakeControl::MEDIATED_EXTERNAL | WakeControl::WAKE_SOURCES;

        Self {
            processor_id,
            ticks_per_read: 1,
            hardware_idle_ticks: 0,
            work_after_polls: Some(0),
            time_base: AtomicU64::new(0),
            polls: AtomicU64::new(0),
            polling: AtomicBool::new(false),
            run_latch: AtomicBool::new(true),
            interrupts_enabled: AtomicBool::new(false),
            thread_priority: Mutex::new(ThreadPriority::Medium),
            wake_control: AtomicU64::new(wake_control.bits()),
            wake_control_writes: AtomicU64::new(0),
            naps: AtomicU64::new(0),
            sleeps: AtomicU64::new(0),
        }
    }

    /// How far the time base advances on every read.
    #[must_use]
    pub fn ticks_per_read(mut self, ticks: u64) -> Self {
        self.ticks_per_read = ticks;
        self
    }

    /// How far the time base advances while the core naps or sleeps.
    #[must_use]
    pub fn hardware_idle_ticks(mut self, ticks: u64) -> Self {
        self.hardware_idle_ticks = ticks;
        self
    }

    /// The scheduler reports work once the core has polled `polls` times without finding any.
    #[must_use]
    pub fn work_after_polls(mut self, polls: u64) -> Self {
        self.work_after_polls = Some(polls);
        self
    }

    /// The scheduler never reports work; only a timeout ends polling.
    #[must_use]
    pub fn no_work(mut self) -> Self {
        self.work_after_polls = None;
        self
    }

    /// Sets the initial value of the wake-source control register.
    #[must_use]
    pub fn initial_wake_control(self, value: WakeControl) -> Self {
        self.wake_control.store(value.bits(), Ordering::Relaxed);
        self
    }

    /// How many times the core asked the scheduler for work.
    #[must_use]
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Whether the polling flag is set.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Relaxed)
    }

    /// Whether the run latch is set.
    #[must_use]
    pub fn is_run_latch_set(&self) -> bool {
        self.run_latch.load(Ordering::Relaxed)
    }

    /// Whether local interrupts have been enabled.
    #[must_use]
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::Relaxed)
    }

    /// The last hardware thread priority set.
    #[must_use]
    pub fn thread_priority(&self) -> ThreadPriority {
        *self.thread_priority.lock()
    }

    /// How many times the wake-source control register was written.
    #[must_use]
    pub fn wake_control_writes(&self) -> u64 {
        self.wake_control_writes.load(Ordering::Relaxed)
    }

    /// How many times the core entered the fast-exit state.
    #[must_use]
    pub fn naps(&self) -> u64 {
        self.naps.load(Ordering::Relaxed)
    }

    /// How many times the core entered the timer-stop state.
    #[must_use]
    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::Relaxed)
    }

    fn idle_in_hardware(&self) {
        self.time_base
            .fetch_add(self.hardware_idle_ticks, Ordering::Relaxed);
    }
}

impl IdleCore for FakeCore {
    fn processor_id(&self) -> ProcessorId {
        self.processor_id
    }

    fn time_base(&self) -> u64 {
        self.time_base.fetch_add(self.ticks_per_read, Ordering::Relaxed)
    }

    fn need_resched(&self) -> bool {
        let previous_polls = self.polls.fetch_add(1, Ordering::Relaxed);

        self.work_after_polls
            .is_some_and(|threshold| previous_polls >= threshold)
    }

    fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::Relaxed);
    }

    fn set_run_latch(&self, running: bool) {
        self.run_latch.store(running, Ordering::Relaxed);
    }

    fn set_thread_priority(&self, priority: ThreadPriority) {
        *self.thread_priority.lock() = priority;
    }

    fn enable_local_interrupts(&self) {
        self.interrupts_enabled.store(true, Ordering::Relaxed);
    }

    fn wake_control(&self) -> WakeControl {
        WakeControl::from_bits_retain(self.wake_control.load(Ordering::Relaxed))
    }

    fn set_wake_control(&self, value: WakeControl) {
        self.wake_control.store(value.bits(), Ordering::Relaxed);
        self.wake_control_writes.fetch_add(1, Ordering::Relaxed);
    }

    fn nap(&self) {
        self.naps.fetch_add(1, Ordering::Relaxed);
        self.idle_in_hardware();
    }

    fn sleep(&self) {
        // The sleep executor must have narrowed the wake sources before getting here.
        debug_assert_eq!(
            self.wake_control() & WakeControl::WAKE_SOURCES,
            WakeControl::WAKE_EXTERNAL
        );

        self.sleeps.fetch_add(1, Ordering::Relaxed);
        self.idle_in_hardware();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(FakeCore: Send, Sync);

    #[test]
    fn work_arrives_after_configured_polls() {
        let core = FakeCore::new(0).work_after_polls(2);

        assert!(!core.need_resched());
        assert!(!core.need_resched());
        assert!(core.need_resched());
        assert_eq!(core.polls(), 3);
    }

    #[test]
    fn no_work_never_reschedules() {
        let core = FakeCore::new(0).no_work();

        assert!((0..100).all(|_| !core.need_resched()));
    }

    #[test]
    fn hardware_idle_advances_time() {
        let core = FakeCore::new(0).ticks_per_read(0).hardware_idle_ticks(50);

        core.nap();
        assert_eq!(core.time_base(), 50);
        assert_eq!(core.naps(), 1);
    }

    #[test]
    fn wake_control_writes_are_counted() {
        let core = FakeCore::new(0).initial_wake_control(WakeControl::WAKE_EXTERNAL);

        assert_eq!(core.wake_control(), WakeControl::WAKE_EXTERNAL);

        core.set_wake_control(WakeControl::WAKE_DECREMENTER);
        assert_eq!(core.wake_control(), WakeControl::WAKE_DECREMENTER);
        assert_eq!(core.wake_control_writes(), 1);
    }
}
