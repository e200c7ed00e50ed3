use std::sync::Arc;
use std::thread;

use hearthbind::scheduler::{Clock, ManualClock, Scheduler};

#[test]
fn producers_on_other_threads_feed_one_consumer() {
    let clock = ManualClock::new(1_000);
    let scheduler: Scheduler<(usize, u64)> = Scheduler::new(Arc::new(clock.clone()));

    let producers: Vec<_> = (0..4)
        .map(|worker| {
            let queue = scheduler.clone();
            thread::spawn(move || {
                for delay in 0..25u64 {
                    queue.schedule(delay * 10, (worker, delay));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread");
    }
    assert_eq!(scheduler.len(), 100);

    clock.advance(120);
    let first = scheduler.pop_ready(clock.now_ms());
    assert_eq!(first.len(), 4 * 13);
    assert!(first.windows(2).all(|pair| pair[0].cycle <= pair[1].cycle));

    clock.advance(1_000);
    let rest = scheduler.pop_ready(scheduler.now());
    assert_eq!(rest.len(), 4 * 12);
    assert!(scheduler.is_empty());
}

#[test]
fn cancelled_tasks_never_come_due() {
    let clock = ManualClock::new(0);
    let scheduler = Scheduler::new(Arc::new(clock.clone()));
    let keep = scheduler.schedule(50, "keep");
    let drop = scheduler.schedule(50, "drop");
    assert_ne!(keep, drop);

    assert!(scheduler.cancel(drop));
    assert!(!scheduler.cancel(drop), "second cancel finds nothing");
    clock.advance(50);
    let due: Vec<_> = scheduler.pop_ready(scheduler.now()).into_iter().map(|task| task.payload).collect();
    assert_eq!(due, vec!["keep"]);
    assert!(!scheduler.cancel(keep), "tasks that already ran cannot be cancelled");
}

#[test]
fn equal_deadlines_keep_submission_order() {
    let scheduler = Scheduler::new(Arc::new(ManualClock::new(0)));
    for label in ["a", "b", "c", "d"] {
        scheduler.schedule_at(10, label);
    }
    let order: Vec<_> = scheduler.pop_ready(10).into_iter().map(|task| task.payload).collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);
}

#[test]
fn only_due_tasks_are_popped() {
    let scheduler = Scheduler::new(Arc::new(ManualClock::new(0)));
    for cycle in [5, 1, 3] {
        scheduler.schedule_at(cycle, cycle);
    }
    assert!(scheduler.pop_ready(0).is_empty());
    let due: Vec<_> = scheduler.pop_ready(3).into_iter().map(|task| task.payload).collect();
    assert_eq!(due, vec![1, 3]);
    assert_eq!(scheduler.next_cycle(), Some(5));
}
