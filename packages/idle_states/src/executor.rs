use std::sync::atomic::{Ordering, fence};

use scopeguard::guard;

use crate::{IdleCore, SystemState, ThreadPriority};

/// The action that enters and exits one kind of idle state.
///
/// Every executor brackets its hardware action with bookkeeping: the run latch is cleared
/// before the core stops doing useful work and set again on the way out, and any core
/// register an executor touches is restored before it returns.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Executor {
    /// Busy-waits at reduced hardware thread priority until work arrives or the snooze timeout
    /// elapses.
    Snooze,

    /// Enters the fast-exit hardware state unconditionally.
    Nap,

    /// Enters the timer-stop hardware state with wake sources narrowed to external interrupts.
    ///
    /// Refuses to sleep until the system is fully running.
    FastSleep,
}

/// How an executor invocation ended.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Outcome {
    /// The state was entered and has been exited.
    Completed {
        /// The polling state gave up because its timeout elapsed.
        timed_out: bool,
    },

    /// The executor refused to enter the state; no time was spent in it.
    Declined,
}

impl Executor {
    /// Runs the executor on the calling core.
    ///
    /// `timeout_ticks` only applies to [`Executor::Snooze`].
    pub(crate) fn enter<C>(self, core: &C, system_state: SystemState, timeout_ticks: u64) -> Outcome
    where
        C: IdleCore + ?Sized,
    {
        match self {
            Self::Snooze => snooze(core, timeout_ticks),
            Self::Nap => nap(core),
            Self::FastSleep => fast_sleep(core, system_state),
        }
    }
}

fn snooze<C>(core: &C, timeout_ticks: u64) -> Outcome
where
    C: IdleCore + ?Sized,
{
    core.enable_local_interrupts();
    core.set_polling(true);

    let deadline = core.time_base().saturating_add(timeout_ticks);
    let mut timed_out = false;

    core.set_run_latch(false);

    while !core.need_resched() {
        core.set_thread_priority(ThreadPriority::Low);
        core.set_thread_priority(ThreadPriority::VeryLow);

        if core.time_base() > deadline {
            timed_out = true;
            break;
        }
    }

    core.set_thread_priority(ThreadPriority::Medium);
    core.set_run_latch(true);
    core.set_polling(false);

    // Whoever sets need_resched after seeing our polling flag must not be missed.
    fence(Ordering::SeqCst);

    Outcome::Completed { timed_out }
}

fn nap<C>(core: &C) -> Outcome
where
    C: IdleCore + ?Sized,
{
    core.set_run_latch(false);
    core.nap();
    core.set_run_latch(true);

    Outcome::Completed { timed_out: false }
}

fn fast_sleep<C>(core: &C, system_state: SystemState) -> Outcome
where
    C: IdleCore + ?Sized,
{
    if system_state < SystemState::Running {
        return Outcome::Declined;
    }

    let saved = core.wake_control();

    // Restored on every exit path, including unwinding out of the hardware action.
    let _restore = guard(saved, |saved| core.set_wake_control(saved));

    core.set_wake_control(saved.for_deep_sleep());

    core.set_run_latch(false);
    core.sleep();
    core.set_run_latch(true);

    Outcome::Completed { timed_out: false }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use mockall::Sequence;
    use mockall::predicate::eq;

    use super::*;
    use crate::{MockIdleCore, WakeControl};

    #[test]
    fn snooze_exits_when_work_arrives() {
        let mut core = MockIdleCore::new();
        let mut seq = Sequence::new();

        core.expect_enable_local_interrupts()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_set_polling()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_time_base()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(0_u64);
        core.expect_set_run_latch()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_need_resched()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(true);
        core.expect_set_thread_priority()
            .with(eq(ThreadPriority::Medium))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_set_run_latch()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_set_polling()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let outcome = Executor::Snooze.enter(&core, SystemState::Running, 1000);

        assert_eq!(outcome, Outcome::Completed { timed_out: false });
    }

    #[test]
    fn snooze_gives_up_after_timeout() {
        let mut core = MockIdleCore::new();

        let now = Cell::new(0_u64);
        core.expect_time_base().returning(move || {
            // Each read advances time by 300 ticks.
            let value = now.get();
            now.set(value + 300);
            value
        });
        core.expect_need_resched().return_const(false);
        core.expect_enable_local_interrupts().return_const(());
        core.expect_set_polling().return_const(());
        core.expect_set_run_latch().return_const(());
        core.expect_set_thread_priority().return_const(());

        let outcome = Executor::Snooze.enter(&core, SystemState::Running, 1000);

        assert_eq!(outcome, Outcome::Completed { timed_out: true });
    }

    #[test]
    fn nap_brackets_hardware_action_with_run_latch() {
        let mut core = MockIdleCore::new();
        let mut seq = Sequence::new();

        core.expect_set_run_latch()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_nap().times(1).in_sequence(&mut seq).return_const(());
        core.expect_set_run_latch()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        // Nap has no precondition, not even a fully running system.
        let outcome = Executor::Nap.enter(&core, SystemState::Booting, 0);

        assert_eq!(outcome, Outcome::Completed { timed_out: false });
    }

    #[test]
    fn fast_sleep_narrows_and_restores_wake_sources() {
        let original = WakeControl::WAKE_EXTERNAL
            | WakeControl::WAKE_DECREMENTER
            | WakeControl::MEDIATED_EXTERNAL
            | WakeControl::from_bits_retain(0x1);

        let mut core = MockIdleCore::new();
        let mut seq = Sequence::new();

        core.expect_wake_control()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(original);
        core.expect_set_wake_control()
            .with(eq(WakeControl::WAKE_EXTERNAL | WakeControl::from_bits_retain(0x1)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_set_run_latch()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_sleep()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_set_run_latch()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        core.expect_set_wake_control()
            .with(eq(original))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let outcome = Executor::FastSleep.enter(&core, SystemState::Running, 0);

        assert_eq!(outcome, Outcome::Completed { timed_out: false });
    }

    #[test]
    fn fast_sleep_declined_before_system_is_running() {
        for state in [SystemState::Booting, SystemState::Scheduling] {
            let mut core = MockIdleCore::new();

            core.expect_wake_control().never();
            core.expect_set_wake_control().never();
            core.expect_sleep().never();
            core.expect_set_run_latch().never();

            let outcome = Executor::FastSleep.enter(&core, state, 0);

            assert_eq!(outcome, Outcome::Declined);
        }
    }
}
