//! A cooperative scheduler running on virtual time.

use crate::TimerId;
use slotmap::SlotMap;

/// A scheduled timer.
#[derive(Clone, Debug)]
struct Timer<E> {
    /// The virtual time at which the timer next fires, in ms.
    due: u64,
    /// The repeat interval for repeating timers, in ms.
    period: Option<u64>,
    /// Breaks ties between timers due at the same time, in creation order.
    seq: u64,
    /// The event delivered when the timer fires.
    event: E,
}

/// Delivers events at points in virtual time.
///
/// Nothing happens on its own: the owner pulls due events with [Scheduler::pop_due]
/// and handles them one at a time, so a handler may freely schedule or cancel timers
/// before the next event is popped.
pub struct Scheduler<E> {
    /// The current virtual time in ms.
    now: u64,
    /// The next sequence number.
    seq: u64,
    /// The pending timers.
    timers: SlotMap<TimerId, Timer<E>>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            now: 0,
            seq: 0,
            timers: SlotMap::with_key(),
        }
    }
}

impl<E: Clone> Scheduler<E> {
    /// Creates a new scheduler at time zero.
    pub fn new() -> Self {
        Default::default()
    }

    /// The current virtual time in ms.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Delivers `event` every `period` ms, starting one period from now.
    pub fn repeat(&mut self, period: u64, event: E) -> TimerId {
        let period = period.max(1);
        self.insert(self.now + period, Some(period), event)
    }

    /// Delivers `event` once, `delay` ms from now.
    pub fn once(&mut self, delay: u64, event: E) -> TimerId {
        self.insert(self.now + delay, None, event)
    }

    /// Cancels a timer. Cancelling a fired or unknown timer does nothing.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    /// Whether a timer is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// The number of pending timers.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Pops the earliest timer due at or before `until`, moving the clock to its due time.
    /// Repeating timers are rescheduled; one-shot timers are removed.
    pub fn pop_due(&mut self, until: u64) -> Option<(TimerId, E)> {
        let (id, _) = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= until)
            .min_by_key(|(_, timer)| (timer.due, timer.seq))?;

        let timer = &mut self.timers[id];
        self.now = u64::max(self.now, timer.due);
        let event = match timer.period {
            Some(period) => {
                timer.due += period;
                timer.event.clone()
            }
            None => self.timers.remove(id)?.event,
        };
        Some((id, event))
    }

    /// Moves the clock forward to `until` once every due event has been handled.
    pub fn settle(&mut self, until: u64) {
        self.now = u64::max(self.now, until);
    }

    fn insert(&mut self, due: u64, period: Option<u64>, event: E) -> TimerId {
        self.seq += 1;
        let seq = self.seq;
        self.timers.insert(Timer {
            due,
            period,
            seq,
            event,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drain(sched: &mut Scheduler<&'static str>, until: u64) -> Vec<(u64, &'static str)> {
        let mut out = vec![];
        while let Some((_, event)) = sched.pop_due(until) {
            out.push((sched.now(), event));
        }
        sched.settle(until);
        out
    }

    #[test]
    fn independent_cadences() {
        let mut sched = Scheduler::new();
        sched.repeat(1000, "light");
        sched.repeat(150, "agent");
        let events = drain(&mut sched, 1000);
        assert_eq!(events.iter().filter(|(_, e)| *e == "agent").count(), 6);
        assert_eq!(events.last(), Some(&(1000, "light")));
        assert_eq!(sched.now(), 1000);
    }

    #[test]
    fn ties_fire_in_creation_order() {
        let mut sched = Scheduler::new();
        sched.repeat(300, "light");
        sched.repeat(150, "agent");
        let events = drain(&mut sched, 300);
        assert_eq!(events, vec![(150, "agent"), (300, "light"), (300, "agent")]);
    }

    #[test]
    fn one_shot_fires_once() {
        let mut sched = Scheduler::new();
        let id = sched.once(3000, "dwell");
        assert!(drain(&mut sched, 2999).is_empty());
        assert!(sched.is_pending(id));
        assert_eq!(drain(&mut sched, 5000), vec![(3000, "dwell")]);
        assert!(!sched.is_pending(id));
        assert_eq!(sched.now(), 5000);
    }

    #[test]
    fn cancellation() {
        let mut sched = Scheduler::new();
        let a = sched.repeat(100, "a");
        let b = sched.once(100, "b");
        assert!(sched.cancel(a));
        assert!(!sched.cancel(a));
        sched.cancel_all();
        assert!(!sched.cancel(b));
        assert_eq!(sched.pending(), 0);
        assert!(drain(&mut sched, 10_000).is_empty());
    }
}
