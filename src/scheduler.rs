//! The discrete-event scheduler (`spec.md` §4.5).
//!
//! A `BinaryHeap`-backed min-heap, monotonic `now`, and best-effort O(n)
//! cancellation by tombstoning dead entries rather than implementing a
//! full heap-removal algorithm — a `BinaryHeap` can't efficiently remove
//! an arbitrary entry, so a cancelled one is marked dead instead and
//! skipped when it's popped. Generalizes a single fixed tick to
//! cycle-stamped events with a priority tiebreaker, and adds the
//! observer interface `spec.md` §4.5 asks for so a debugger attached to
//! the scheduler can watch events fire without polling.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::addr::Cycle;
use crate::ids::EventHandle;

/// Callback invoked when a scheduled event fires. Receives `&mut
/// Scheduler` so it can reschedule further events from within the
/// callback (`spec.md` §4.5: "If a callback schedules additional events
/// with `due <= to_cycle`, they also fire before `advance` returns").
pub type EventCallback = Box<dyn FnMut(&mut Scheduler) + Send>;

/// Everything about a scheduled event except the callback itself;
/// handed to observers and to `next_due`/inspection APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub handle: EventHandle,
    pub due_cycle: Cycle,
    pub kind: String,
    pub priority: i32,
    pub tag: Option<String>,
}

/// Subscriber notified synchronously, on the scheduler's own thread,
/// immediately after the underlying mutation (`spec.md` §4.5).
pub trait SchedulerObserver {
    fn event_scheduled(&mut self, _meta: &EventMeta) {}
    fn event_consumed(&mut self, _meta: &EventMeta) {}
    fn event_cancelled(&mut self, _handle: EventHandle) {}
}

struct QueuedEvent {
    meta: EventMeta,
    /// `None` once cancelled; tombstoned entries are discarded, not
    /// fired, the next time they reach the top of the heap.
    callback: Option<EventCallback>,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.meta.due_cycle == other.meta.due_cycle
            && self.meta.priority == other.meta.priority
            && self.meta.handle == other.meta.handle
    }
}
impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordering among pending events per `spec.md` §3: primary by
/// `due_cycle` ascending, ties by `priority` descending, then by
/// `handle` ascending. `BinaryHeap` is a max-heap, so "should fire
/// first" must compare as `Greater`.
impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .meta
            .due_cycle
            .cmp(&self.meta.due_cycle)
            .then_with(|| self.meta.priority.cmp(&other.meta.priority))
            .then_with(|| other.meta.handle.cmp(&self.meta.handle))
    }
}

/// Single-threaded cooperative discrete-event scheduler. Not backed by
/// real time; advanced only by explicit calls from the machine run
/// loop (`spec.md` §4.5, §5).
pub struct Scheduler {
    now: Cycle,
    queue: BinaryHeap<QueuedEvent>,
    next_handle: u64,
    pending: usize,
    observers: Vec<Box<dyn SchedulerObserver>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Cycle::ZERO,
            queue: BinaryHeap::new(),
            next_handle: 0,
            pending: 0,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn SchedulerObserver>) {
        self.observers.push(observer);
    }

    #[must_use]
    pub fn now(&self) -> Cycle {
        self.now
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
    }

    /// The due cycle of the next live (non-cancelled) event, if any.
    /// Evicts tombstoned entries sitting at the top of the heap first.
    pub fn next_due(&mut self) -> Option<Cycle> {
        self.evict_dead_top();
        self.queue.peek().map(|e| e.meta.due_cycle)
    }

    fn evict_dead_top(&mut self) {
        while matches!(self.queue.peek(), Some(e) if e.callback.is_none()) {
            self.queue.pop();
        }
    }

    pub fn schedule_at(
        &mut self,
        due_cycle: Cycle,
        kind: impl Into<String>,
        priority: i32,
        callback: EventCallback,
        tag: Option<String>,
    ) -> EventHandle {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;
        let meta = EventMeta { handle, due_cycle, kind: kind.into(), priority, tag };
        for obs in &mut self.observers {
            obs.event_scheduled(&meta);
        }
        self.queue.push(QueuedEvent { meta, callback: Some(callback) });
        self.pending += 1;
        handle
    }

    pub fn schedule_after(
        &mut self,
        delta: u64,
        kind: impl Into<String>,
        priority: i32,
        callback: EventCallback,
        tag: Option<String>,
    ) -> EventHandle {
        self.schedule_at(self.now + delta, kind, priority, callback, tag)
    }

    /// Cancel a pending event. Returns `false` if the handle is unknown
    /// or has already fired (`spec.md` §4.5: "cancellation after fire is
    /// a no-op that returns `false`").
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        // BinaryHeap has no targeted removal; drain, tombstone, rebuild.
        let mut found = false;
        let entries: Vec<QueuedEvent> = self.queue.drain().collect();
        let rebuilt = entries
            .into_iter()
            .map(|mut e| {
                if e.meta.handle == handle && e.callback.is_some() {
                    e.callback = None;
                    found = true;
                }
                e
            })
            .collect();
        self.queue = rebuilt;
        if found {
            self.pending -= 1;
            for obs in &mut self.observers {
                obs.event_cancelled(handle);
            }
        }
        found
    }

    /// Fire the single next due event, if its `due_cycle <= to_cycle`.
    /// Returns `true` if an event fired.
    fn fire_next_if_due(&mut self, to_cycle: Cycle) -> bool {
        self.evict_dead_top();
        let due = match self.queue.peek() {
            Some(e) if e.meta.due_cycle <= to_cycle => e.meta.due_cycle,
            _ => return false,
        };
        let mut entry = self.queue.pop().expect("peeked Some above");
        self.now = due;
        self.pending -= 1;
        if let Some(mut callback) = entry.callback.take() {
            callback(self);
            for obs in &mut self.observers {
                obs.event_consumed(&entry.meta);
            }
        }
        true
    }

    /// Fire every event due at or before `to_cycle`, in scheduler order.
    /// Events a callback schedules with `due <= to_cycle` also fire
    /// before this returns. `now` ends exactly at `to_cycle`
    /// (`spec.md` §4.5).
    pub fn advance(&mut self, to_cycle: Cycle) {
        while self.fire_next_if_due(to_cycle) {}
        if to_cycle > self.now {
            self.now = to_cycle;
        }
    }

    /// Fire events already due (`due <= now`) without moving `now`
    /// forward beyond them.
    pub fn drain_ready(&mut self) {
        let now = self.now;
        self.advance(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn noop_callback() -> EventCallback {
        Box::new(|_s: &mut Scheduler| {})
    }

    #[test]
    fn monotone_clock_never_decreases() {
        let mut s = Scheduler::new();
        s.schedule_at(Cycle(10), "a", 0, noop_callback(), None);
        s.advance(Cycle(10));
        assert_eq!(s.now(), Cycle(10));
        s.advance(Cycle(20));
        assert_eq!(s.now(), Cycle(20));
    }

    #[test]
    fn cancel_is_a_one_shot_no_op_after_fire() {
        let mut s = Scheduler::new();
        let h = s.schedule_at(Cycle(5), "a", 0, noop_callback(), None);
        s.advance(Cycle(5));
        assert!(!s.cancel(h));
    }

    #[test]
    fn cancelled_event_never_fires() {
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        let mut s = Scheduler::new();
        let h = s.schedule_at(
            Cycle(5),
            "a",
            0,
            Box::new(move |_s| *fired2.borrow_mut() = true),
            None,
        );
        assert!(s.cancel(h));
        s.advance(Cycle(10));
        assert!(!*fired.borrow());
    }

    /// Scenario S4 — scheduler ordering (`spec.md` §8).
    #[test]
    fn scenario_s4_ordering() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new();
        let mk = |tag: &'static str, order: &Rc<RefCell<Vec<&'static str>>>| -> EventCallback {
            let order = order.clone();
            Box::new(move |_s| order.borrow_mut().push(tag))
        };
        s.schedule_at(Cycle(100), "e1", 1, mk("e1", &order), None);
        s.schedule_at(Cycle(100), "e2", 5, mk("e2", &order), None);
        s.schedule_at(Cycle(100), "e3", 5, mk("e3", &order), None);
        s.schedule_at(Cycle(50), "e4", 1, mk("e4", &order), None);
        s.advance(Cycle(200));
        assert_eq!(*order.borrow(), vec!["e4", "e2", "e3", "e1"]);
        assert_eq!(s.now(), Cycle(200));
    }

    #[test]
    fn pending_count_tracks_live_events() {
        let mut s = Scheduler::new();
        assert_eq!(s.pending_count(), 0);
        let h1 = s.schedule_at(Cycle(5), "a", 0, noop_callback(), None);
        s.schedule_at(Cycle(10), "b", 0, noop_callback(), None);
        assert_eq!(s.pending_count(), 2);
        s.cancel(h1);
        assert_eq!(s.pending_count(), 1);
        s.advance(Cycle(10));
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn a_callback_can_schedule_further_events_that_still_fire_this_advance() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new();
        let order2 = order.clone();
        s.schedule_at(
            Cycle(10),
            "first",
            0,
            Box::new(move |s: &mut Scheduler| {
                order2.borrow_mut().push("first");
                let order3 = order2.clone();
                s.schedule_at(
                    Cycle(15),
                    "second",
                    0,
                    Box::new(move |_s| order3.borrow_mut().push("second")),
                    None,
                );
            }),
            None,
        );
        s.advance(Cycle(20));
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn next_due_skips_cancelled_entries() {
        let mut s = Scheduler::new();
        let h = s.schedule_at(Cycle(5), "a", 0, noop_callback(), None);
        s.schedule_at(Cycle(10), "b", 0, noop_callback(), None);
        s.cancel(h);
        assert_eq!(s.next_due(), Some(Cycle(10)));
    }
}
