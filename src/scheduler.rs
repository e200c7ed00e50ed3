//! Deferred task queue ordered by absolute due time.
//!
//! Producers on any thread may schedule or cancel; a single consumer drains due tasks with
//! [`Scheduler::pop_ready`] and runs them after the lock has been released.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

pub type TaskId = u64;

/// Millisecond time source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Externally driven clock for simulations and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_ms)))
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, AtomicOrdering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) -> u64 {
        self.0.fetch_add(delta_ms, AtomicOrdering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(AtomicOrdering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScheduledTask<T> {
    pub id: TaskId,
    /// Absolute due time in clock milliseconds.
    pub cycle: u64,
    pub payload: T,
}

struct QueueEntry<T> {
    cycle: u64,
    seq: u64,
    task: ScheduledTask<T>,
}

// Reversed so the std max-heap pops the earliest cycle first; ties go to the lower sequence.
impl<T> Ord for QueueEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cycle.cmp(&self.cycle).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cycle == other.cycle && self.seq == other.seq
    }
}

impl<T> Eq for QueueEntry<T> {}

struct Queue<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_seq: u64,
    next_id: TaskId,
}

pub struct Scheduler<T> {
    queue: Arc<Mutex<Queue<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self { queue: Arc::clone(&self.queue), clock: Arc::clone(&self.clock) }
    }
}

impl<T> std::fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("pending", &self.len()).finish()
    }
}

impl<T> Scheduler<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Queue { heap: BinaryHeap::new(), next_seq: 0, next_id: 1 })),
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Schedules `payload` to run `delay_ms` from now.
    pub fn schedule(&self, delay_ms: u64, payload: T) -> TaskId {
        let cycle = self.now().saturating_add(delay_ms);
        self.schedule_at(cycle, payload)
    }

    pub fn schedule_at(&self, cycle: u64, payload: T) -> TaskId {
        let mut queue = self.queue.lock();
        let id = queue.next_id;
        queue.next_id += 1;
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(QueueEntry { cycle, seq, task: ScheduledTask { id, cycle, payload } });
        id
    }

    /// Removes a pending task. Returns false when it already ran or never existed.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut queue = self.queue.lock();
        let before = queue.heap.len();
        queue.heap.retain(|entry| entry.task.id != id);
        queue.heap.len() != before
    }

    /// Takes every task due at or before `now`, earliest first.
    pub fn pop_ready(&self, now: u64) -> Vec<ScheduledTask<T>> {
        let mut queue = self.queue.lock();
        let mut ready = Vec::new();
        while queue.heap.peek().is_some_and(|entry| entry.cycle <= now) {
            if let Some(entry) = queue.heap.pop() {
                ready.push(entry.task);
            }
        }
        ready
    }

    pub fn next_cycle(&self) -> Option<u64> {
        self.queue.lock().heap.peek().map(|entry| entry.cycle)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn manual() -> (ManualClock, Scheduler<&'static str>) {
        let clock = ManualClock::new(0);
        let scheduler = Scheduler::new(Arc::new(clock.clone()));
        (clock, scheduler)
    }

    #[test]
    fn due_tasks_come_out_in_cycle_order() {
        let (_, scheduler) = manual();
        scheduler.schedule_at(5, "five");
        scheduler.schedule_at(1, "one");
        scheduler.schedule_at(3, "three");
        let order: Vec<_> = scheduler.pop_ready(10).into_iter().map(|task| task.cycle).collect();
        assert_eq!(order, vec![1, 3, 5]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn equal_cycles_run_in_insertion_order() {
        let (_, scheduler) = manual();
        for name in ["a", "b", "c", "d"] {
            scheduler.schedule_at(4, name);
        }
        let names: Vec<_> = scheduler.pop_ready(4).into_iter().map(|task| task.payload).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn tasks_wait_for_their_cycle() {
        let (clock, scheduler) = manual();
        clock.set(100);
        scheduler.schedule(50, "later");
        assert!(scheduler.pop_ready(clock.now_ms()).is_empty());
        assert_eq!(scheduler.next_cycle(), Some(150));
        let now = clock.advance(50);
        assert_eq!(scheduler.pop_ready(now).len(), 1);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let (_, scheduler) = manual();
        let keep = scheduler.schedule_at(1, "keep");
        let drop = scheduler.schedule_at(1, "drop");
        assert!(scheduler.cancel(drop));
        assert!(!scheduler.cancel(drop));
        let ready = scheduler.pop_ready(1);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, keep);
    }

    #[test]
    fn producers_on_other_threads_share_the_queue() {
        let clock = ManualClock::new(0);
        let scheduler: Scheduler<u64> = Scheduler::new(Arc::new(clock));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let producer = scheduler.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        producer.schedule_at(worker * 100 + i, worker);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let cycles: Vec<_> = scheduler.pop_ready(u64::MAX).into_iter().map(|task| task.cycle).collect();
        assert_eq!(cycles.len(), 100);
        assert!(cycles.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
