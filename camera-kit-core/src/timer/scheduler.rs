//! Time sources for the deadline timer.
//!
//! `ThreadScheduler` runs each schedule on a dedicated thread and is what a
//! session uses by default. `ManualScheduler` keeps a virtual clock that only
//! moves when `advance` is called, which makes tick sequences deterministic.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::models::error::CaptureError;

/// Work run when a schedule fires.
pub type Task = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle to a pending schedule. Dropping the handle cancels it.
pub trait ScheduledTask: Send {
    /// Time left until the next firing; zero once fired or cancelled.
    fn time_until_next_fire(&self) -> Duration;

    fn cancel(&self);
}

/// Source of repeating and one-shot schedules.
pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval`, first after one full interval.
    fn schedule_repeating(
        &self,
        interval: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError>;

    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: Task)
        -> Result<Box<dyn ScheduledTask>, CaptureError>;
}

// --- Thread-backed scheduler ---

/// Scheduler that spawns one named thread per schedule.
///
/// Threads sleep on a cancellation channel, so cancelling (or dropping the
/// handle) wakes them immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }

    fn spawn(
        &self,
        first: Duration,
        interval: Option<Duration>,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(1);
        let next_fire = Arc::new(Mutex::new(Instant::now() + first));
        let thread_next = Arc::clone(&next_fire);

        thread::Builder::new()
            .name("deadline-timer".into())
            .spawn(move || loop {
                let deadline = *thread_next.lock();
                match cancel_rx.recv_deadline(deadline) {
                    Err(RecvTimeoutError::Timeout) => {
                        match interval {
                            Some(every) => *thread_next.lock() = deadline + every,
                            None => *thread_next.lock() = Instant::now(),
                        }
                        task();
                        if interval.is_none() {
                            break;
                        }
                    }
                    // Cancelled, or the handle was dropped.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn timer thread: {}", e)))?;

        Ok(Box::new(ThreadTask {
            cancel_tx,
            next_fire,
        }))
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(
        &self,
        interval: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        self.spawn(interval, Some(interval), task)
    }

    fn schedule_once(
        &self,
        delay: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        self.spawn(delay, None, task)
    }
}

struct ThreadTask {
    cancel_tx: Sender<()>,
    next_fire: Arc<Mutex<Instant>>,
}

impl ScheduledTask for ThreadTask {
    fn time_until_next_fire(&self) -> Duration {
        self.next_fire.lock().saturating_duration_since(Instant::now())
    }

    fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }
}

// --- Virtual-clock scheduler ---

struct ManualEntry {
    id: u64,
    due: Duration,
    interval: Option<Duration>,
    task: Task,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    entries: Vec<ManualEntry>,
}

/// Scheduler driven by an explicit virtual clock.
///
/// Tasks run synchronously on the thread calling [`ManualScheduler::advance`],
/// in due order. Tasks may schedule or cancel other tasks while running.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of schedules still pending.
    pub fn pending(&self) -> usize {
        self.clock.lock().entries.len()
    }

    /// Move the clock forward by `by`, running every task that comes due.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.lock().now + by;
        loop {
            let task = {
                let mut clock = self.clock.lock();
                let next = clock
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due <= target)
                    .min_by_key(|(_, e)| (e.due, e.id))
                    .map(|(index, _)| index);

                let Some(index) = next else {
                    clock.now = target;
                    break;
                };

                let due = clock.entries[index].due;
                let interval = clock.entries[index].interval;
                clock.now = due;
                match interval {
                    Some(every) => {
                        clock.entries[index].due = due + every;
                        Arc::clone(&clock.entries[index].task)
                    }
                    None => clock.entries.remove(index).task,
                }
            };
            // Run without the clock lock so the task can reschedule.
            task();
        }
    }

    /// Advance in seconds.
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    fn insert(&self, first: Duration, interval: Option<Duration>, task: Task) -> Box<dyn ScheduledTask> {
        let mut clock = self.clock.lock();
        let id = clock.next_id;
        clock.next_id += 1;
        let due = clock.now + first;
        clock.entries.push(ManualEntry {
            id,
            due,
            interval,
            task,
        });
        Box::new(ManualTask {
            id,
            clock: Arc::clone(&self.clock),
        })
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(
        &self,
        interval: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        Ok(self.insert(interval, Some(interval), task))
    }

    fn schedule_once(
        &self,
        delay: Duration,
        task: Task,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        Ok(self.insert(delay, None, task))
    }
}

struct ManualTask {
    id: u64,
    clock: Arc<Mutex<ManualClock>>,
}

impl ScheduledTask for ManualTask {
    fn time_until_next_fire(&self) -> Duration {
        let clock = self.clock.lock();
        clock
            .entries
            .iter()
            .find(|e| e.id == self.id)
            .map(|e| e.due.saturating_sub(clock.now))
            .unwrap_or(Duration::ZERO)
    }

    fn cancel(&self) {
        self.clock.lock().entries.retain(|e| e.id != self.id);
    }
}

impl Drop for ManualTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Task) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let task: Task = Arc::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, task)
    }

    #[test]
    fn manual_repeating_fires_per_interval() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        let _handle = scheduler
            .schedule_repeating(Duration::from_millis(100), task)
            .unwrap();

        scheduler.advance(Duration::from_millis(99));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.advance(Duration::from_millis(251));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.now(), Duration::from_millis(350));
    }

    #[test]
    fn manual_once_fires_a_single_time() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        let handle = scheduler.schedule_once(Duration::from_millis(30), task).unwrap();

        assert_eq!(handle.time_until_next_fire(), Duration::from_millis(30));
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(handle.time_until_next_fire(), Duration::ZERO);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn manual_cancel_and_drop_remove_entries() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        let handle = scheduler
            .schedule_repeating(Duration::from_millis(10), Arc::clone(&task))
            .unwrap();
        handle.cancel();
        scheduler.advance(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let handle = scheduler.schedule_once(Duration::from_millis(10), task).unwrap();
        drop(handle);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn manual_time_until_next_fire_tracks_clock() {
        let scheduler = ManualScheduler::new();
        let (_, task) = counter();
        let handle = scheduler
            .schedule_repeating(Duration::from_millis(500), task)
            .unwrap();
        scheduler.advance(Duration::from_millis(700));
        assert_eq!(handle.time_until_next_fire(), Duration::from_millis(300));
    }

    #[test]
    fn thread_scheduler_fires_and_cancels() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let task: Task = Arc::new(move || {
            let _ = tx.send(());
        });
        let handle = scheduler
            .schedule_repeating(Duration::from_millis(5), task)
            .unwrap();

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        handle.cancel();
        drop(handle);

        // Drain anything already in flight, then expect silence.
        while rx.recv_timeout(Duration::from_millis(50)).is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn thread_scheduler_once_reports_remaining_time() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let task: Task = Arc::new(move || {
            let _ = tx.send(());
        });
        let handle = scheduler.schedule_once(Duration::from_secs(60), task).unwrap();
        let remaining = handle.time_until_next_fire();
        assert!(remaining > Duration::from_secs(59));
        handle.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
