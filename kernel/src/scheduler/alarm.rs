//! Timer-driven sleep queue.
//!
//! `wait_until(x)` parks the caller until the first timer interrupt at or
//! after `now + x`. The timer interrupt wakes every due sleeper, earliest
//! wake time first.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::Scheduler;
use crate::machine::Machine;
use crate::sync::Completion;

struct Sleeper {
    wake_time: u64,
    seq: u64,
    completion: Arc<Completion>,
}

/// Sleep queue woken by the timer.
#[derive(Default)]
pub struct Alarm {
    sleepers: Mutex<Vec<Sleeper>>,
    next_seq: AtomicU64,
}

impl Alarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for at least `ticks` ticks of machine time. Non-positive
    /// values return immediately.
    pub fn wait_until(&self, machine: &Machine, scheduler: &dyn Scheduler, ticks: i64) {
        if ticks <= 0 {
            return;
        }
        let completion = Arc::new(Completion::new());
        let wake_time = machine.now().saturating_add(ticks as u64);
        self.sleepers.lock().push(Sleeper {
            wake_time,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            completion: completion.clone(),
        });
        log::debug!("[alarm] sleeping until tick {}", wake_time);
        completion.wait(scheduler);
    }

    /// Wake every sleeper whose wake time has passed. Returns how many woke.
    pub fn timer_interrupt(&self, machine: &Machine) -> usize {
        let now = machine.now();
        let mut due = Vec::new();
        self.sleepers.lock().retain_mut(|sleeper| {
            if sleeper.wake_time <= now {
                due.push((sleeper.wake_time, sleeper.seq, sleeper.completion.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(wake_time, seq, _)| (*wake_time, *seq));
        for (_, _, completion) in &due {
            completion.signal();
        }
        due.len()
    }

    /// Contexts currently asleep.
    pub fn sleeping(&self) -> usize {
        self.sleepers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TIMER_INTERRUPT_PERIOD;
    use crate::scheduler::SchedulerError;
    use alloc::boxed::Box;
    use core::sync::atomic::AtomicUsize;

    /// Every yield is one timer period of machine time.
    struct Ticking<'a> {
        machine: &'a Machine,
        alarm: &'a Alarm,
        yields: AtomicUsize,
    }

    impl Scheduler for Ticking<'_> {
        fn fork(&self, _name: &str, _body: Box<dyn FnOnce() + Send>) -> Result<(), SchedulerError> {
            Err(SchedulerError::Unavailable)
        }

        fn yield_now(&self) {
            self.yields.fetch_add(1, Ordering::SeqCst);
            self.machine.advance_clock(TIMER_INTERRUPT_PERIOD);
            self.alarm.timer_interrupt(self.machine);
        }
    }

    #[test]
    fn test_wait_until_sleeps_past_deadline() {
        let machine = Machine::new(1);
        let alarm = Alarm::new();
        let scheduler = Ticking {
            machine: &machine,
            alarm: &alarm,
            yields: AtomicUsize::new(0),
        };

        alarm.wait_until(&machine, &scheduler, 1200);
        assert!(machine.now() >= 1200);
        assert_eq!(scheduler.yields.load(Ordering::SeqCst), 3);
        assert_eq!(alarm.sleeping(), 0);
    }

    #[test]
    fn test_non_positive_wait_returns() {
        let machine = Machine::new(1);
        let alarm = Alarm::new();
        let scheduler = Ticking {
            machine: &machine,
            alarm: &alarm,
            yields: AtomicUsize::new(0),
        };
        alarm.wait_until(&machine, &scheduler, 0);
        alarm.wait_until(&machine, &scheduler, -5);
        assert_eq!(scheduler.yields.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_interrupt_wakes_only_due() {
        let machine = Machine::new(1);
        let alarm = Alarm::new();
        let early = Arc::new(Completion::new());
        let late = Arc::new(Completion::new());
        alarm.sleepers.lock().push(Sleeper {
            wake_time: 100,
            seq: 0,
            completion: early.clone(),
        });
        alarm.sleepers.lock().push(Sleeper {
            wake_time: 900,
            seq: 1,
            completion: late.clone(),
        });

        machine.advance_clock(500);
        assert_eq!(alarm.timer_interrupt(&machine), 1);
        assert!(early.is_signaled());
        assert!(!late.is_signaled());
        assert_eq!(alarm.sleeping(), 1);
    }
}
