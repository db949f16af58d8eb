//! End-to-end exercises of the scheduling core across real threads: the
//! literal scenarios from the crate's design docs (idle dispatch ordering,
//! cancel-then-reset, delete-from-run), run through the public `Builder` /
//! `Task` surface rather than any single module's internals.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskthread_sched::idle::{IdleTask, TimeoutTask};
use taskthread_sched::task::{TaskThreadPool, IDLE, KILL, TIMEOUT};
use taskthread_sched::{Builder, Task, TaskBody};

struct RecordRuns {
    order: Arc<Mutex<Vec<&'static str>>>,
    label: &'static str,
}

impl TaskBody for RecordRuns {
    fn run(&self, task: &Task) -> i64 {
        task.get_events();
        self.order.lock().unwrap().push(self.label);
        0
    }
}

#[test]
fn idle_tasks_fire_in_deadline_order() {
    let pool = TaskThreadPool::add_threads(1, 1).unwrap();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut idles = Vec::new();
    for (label, delay) in [("c", 30), ("a", 10), ("b", 20)] {
        let task = Task::new(
            pool.clone(),
            RecordRuns {
                order: order.clone(),
                label,
            },
        );
        let idle = IdleTask::new(task);
        idle.set_idle_timer(delay);
        idles.push(idle);
    }

    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    pool.remove_threads();
}

#[test]
fn cancel_then_reset_fires_once_near_the_new_deadline() {
    let pool = TaskThreadPool::add_threads(1, 1).unwrap();
    let fired_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

    struct RecordFireTime(Arc<Mutex<Option<Instant>>>);
    impl TaskBody for RecordFireTime {
        fn run(&self, task: &Task) -> i64 {
            if task.get_events() & IDLE != 0 {
                *self.0.lock().unwrap() = Some(Instant::now());
            }
            0
        }
    }

    let task = Task::new(pool.clone(), RecordFireTime(fired_at.clone()));
    let idle = IdleTask::new(task);

    let start = Instant::now();
    idle.set_idle_timer(1000);

    std::thread::sleep(Duration::from_millis(10));
    idle.cancel_timeout();

    std::thread::sleep(Duration::from_millis(10));
    idle.set_idle_timer(50);

    std::thread::sleep(Duration::from_millis(200));

    let elapsed = fired_at
        .lock()
        .unwrap()
        .expect("idle task should have fired")
        .duration_since(start);
    assert!(
        elapsed.as_millis() >= 50 && elapsed.as_millis() <= 150,
        "fired at {elapsed:?}, expected near 70ms"
    );
    pool.remove_threads();
}

#[test]
fn deleting_task_from_run_unlinks_it_before_drop() {
    let pool = TaskThreadPool::add_threads(1, 1).unwrap();
    let dropped = Arc::new(AtomicUsize::new(0));

    struct DeleteOnKill(Arc<AtomicUsize>);
    impl TaskBody for DeleteOnKill {
        fn run(&self, task: &Task) -> i64 {
            let events = task.get_events();
            if events & KILL != 0 {
                -1
            } else {
                0
            }
        }
    }
    impl Drop for DeleteOnKill {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let task = Task::new(pool.clone(), DeleteOnKill(dropped.clone()));
    task.signal(KILL);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
    pool.remove_threads();
}

#[test]
fn blocking_class_task_does_not_stall_short_task_workers() {
    use taskthread_sched::task::{WorkerClass, START};

    let pool = TaskThreadPool::add_threads(1, 1).unwrap();

    struct SlowBody;
    impl TaskBody for SlowBody {
        fn run(&self, task: &Task) -> i64 {
            task.get_events();
            std::thread::sleep(Duration::from_millis(300));
            0
        }
    }
    struct QuickBody(Arc<AtomicUsize>);
    impl TaskBody for QuickBody {
        fn run(&self, task: &Task) -> i64 {
            task.get_events();
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    let blocker = Task::new(pool.clone(), SlowBody);
    blocker.set_worker_class(WorkerClass::Blocking);
    blocker.signal(START);
    std::thread::sleep(Duration::from_millis(50));

    let ran = Arc::new(AtomicUsize::new(0));
    let quick = Task::new(pool.clone(), QuickBody(ran.clone()));
    quick.set_worker_class(WorkerClass::Short);
    quick.signal(START);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
        ran.load(Ordering::SeqCst),
        1,
        "a short-task worker must not be stalled by a long blocking-class run()"
    );

    pool.remove_threads();
}

#[test]
fn timeout_task_fires_through_builder_assembled_pool() {
    let scheduler = Builder::new_multi_thread()
        .short_task_threads(2)
        .blocking_threads(1)
        .build()
        .unwrap();

    let fired = Arc::new(Mutex::new(false));
    struct MarkFired(Arc<Mutex<bool>>);
    impl TaskBody for MarkFired {
        fn run(&self, task: &Task) -> i64 {
            if task.get_events() & TIMEOUT != 0 {
                *self.0.lock().unwrap() = true;
            }
            0
        }
    }

    let consumer = Task::new(scheduler.pool().clone(), MarkFired(fired.clone()));
    let _timeout = TimeoutTask::new(scheduler.pool().clone(), consumer, 30);

    std::thread::sleep(Duration::from_millis(250));
    assert!(*fired.lock().unwrap());

    scheduler.shutdown();
}
