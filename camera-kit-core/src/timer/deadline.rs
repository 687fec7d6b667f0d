use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::timer::scheduler::{ScheduledTask, Scheduler, Task};

/// Tolerance for comparing accumulated elapsed time against the deadline.
const DEADLINE_EPSILON: f64 = 1e-9;

/// Deadline timer state machine.
///
/// ```text
/// unknown → running ⇄ paused
///              ↓        ↓
///         stopped / ended   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Unknown,
    Running,
    Paused,
    Stopped,
    Ended,
}

impl TimerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Ended)
    }
}

/// Lifecycle notifications emitted by a [`DeadlineTimer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerEvent {
    WillStart,
    DidFire { elapsed_secs: f64 },
    DidPause,
    WillResume,
    DidStop,
    DidEnd { elapsed_secs: f64 },
}

impl TimerEvent {
    /// `MM:SS.f` rendering of the elapsed time, for tick and end events.
    pub fn elapsed_display(&self) -> Option<String> {
        match self {
            Self::DidFire { elapsed_secs } | Self::DidEnd { elapsed_secs } => {
                Some(format_elapsed(*elapsed_secs))
            }
            _ => None,
        }
    }
}

/// Receives timer events. Called without the timer lock held.
pub trait TimerObserver: Send + Sync {
    fn on_timer_event(&self, event: &TimerEvent);
}

impl TimerObserver for Sender<TimerEvent> {
    fn on_timer_event(&self, event: &TimerEvent) {
        // The receiver going away just means nobody is listening anymore.
        let _ = self.send(*event);
    }
}

/// Render seconds as `MM:SS.f`.
///
/// The value is snapped to whole microseconds first, then minutes, whole
/// seconds and the first decimal are truncated, never rounded.
pub fn format_elapsed(secs: f64) -> String {
    let micros = (secs.max(0.0) * 1e6).round() as u64;
    let minutes = micros / 60_000_000;
    let seconds = (micros / 1_000_000) % 60;
    let tenths = (micros % 1_000_000) / 100_000;
    format!("{:02}:{:02}.{:01}", minutes, seconds, tenths)
}

struct TimerCore {
    state: TimerState,
    interval: Duration,
    end_secs: f64,
    ticks: u64,
    remaining_on_pause: Duration,
    /// Pending repeating tick or resume delay. `Some` means "ticking".
    schedule: Option<Box<dyn ScheduledTask>>,
    /// Bumped on every (re)schedule so stale callbacks become no-ops.
    generation: u64,
}

impl TimerCore {
    fn elapsed_secs(&self) -> f64 {
        let nanos = u128::from(self.ticks) * self.interval.as_nanos();
        nanos as f64 / 1e9
    }

    fn reset(&mut self) {
        self.ticks = 0;
        self.remaining_on_pause = Duration::ZERO;
    }

    fn cancel_schedule(&mut self) {
        if let Some(task) = self.schedule.take() {
            task.cancel();
        }
        self.generation += 1;
    }

    fn fire(&mut self) -> TimerEvent {
        self.ticks += 1;
        let elapsed_secs = self.elapsed_secs();

        if elapsed_secs + DEADLINE_EPSILON >= self.end_secs {
            self.cancel_schedule();
            self.state = TimerState::Ended;
            self.reset();
            TimerEvent::DidEnd { elapsed_secs }
        } else {
            TimerEvent::DidFire { elapsed_secs }
        }
    }
}

/// Periodic countdown enforcing a maximum duration.
///
/// Ticks every `interval`; once the accumulated time reaches `end_secs` the
/// timer ends itself. Pausing keeps the time left until the next tick so a
/// resumed timer does not lose or gain a partial interval.
///
/// Precondition failures are returned as [`CaptureError::InvalidState`] and
/// never change the state.
pub struct DeadlineTimer {
    core: Arc<Mutex<TimerCore>>,
    observer: Arc<dyn TimerObserver>,
    scheduler: Arc<dyn Scheduler>,
}

impl DeadlineTimer {
    pub fn new(
        end_secs: f64,
        interval: Duration,
        observer: Arc<dyn TimerObserver>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(TimerCore {
                state: TimerState::Unknown,
                interval,
                end_secs,
                ticks: 0,
                remaining_on_pause: Duration::ZERO,
                schedule: None,
                generation: 0,
            })),
            observer,
            scheduler,
        }
    }

    pub fn state(&self) -> TimerState {
        self.core.lock().state
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.core.lock().elapsed_secs()
    }

    pub fn end_secs(&self) -> f64 {
        self.core.lock().end_secs
    }

    /// Whether a tick or a resume delay is currently scheduled.
    pub fn is_ticking(&self) -> bool {
        self.core.lock().schedule.is_some()
    }

    /// Begin ticking. If already ticking, fire one tick immediately instead.
    pub fn start(&self) -> Result<(), CaptureError> {
        let events = {
            let mut core = self.core.lock();
            if core.schedule.is_some() {
                let event = core.fire();
                if core.state != TimerState::Ended {
                    core.state = TimerState::Running;
                }
                vec![event]
            } else {
                if core.state != TimerState::Unknown {
                    return Err(CaptureError::InvalidState(format!(
                        "cannot start a timer in {:?} state",
                        core.state
                    )));
                }
                let task = self.schedule_ticks(&mut core)?;
                core.schedule = Some(task);
                core.state = TimerState::Running;
                vec![TimerEvent::WillStart]
            }
        };
        self.emit(&events);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        {
            let mut core = self.core.lock();
            let Some(task) = core.schedule.as_ref() else {
                return Err(CaptureError::InvalidState("timer is not running".into()));
            };
            core.remaining_on_pause = task.time_until_next_fire();
            core.cancel_schedule();
            core.state = TimerState::Paused;
        }
        self.emit(&[TimerEvent::DidPause]);
        Ok(())
    }

    /// Resume after the time that was left on the interrupted tick.
    pub fn resume(&self) -> Result<(), CaptureError> {
        {
            let mut core = self.core.lock();
            if core.schedule.is_some() {
                return Err(CaptureError::InvalidState(
                    "timer should be paused before resuming".into(),
                ));
            }
            if core.state != TimerState::Paused {
                return Err(CaptureError::InvalidState(format!(
                    "cannot resume a timer in {:?} state",
                    core.state
                )));
            }

            core.generation += 1;
            let generation = core.generation;
            let weak = Arc::downgrade(&self.core);
            let observer = Arc::clone(&self.observer);
            let scheduler = Arc::clone(&self.scheduler);
            let task: Task = Arc::new(move || {
                Self::resume_ticking(&weak, &observer, &scheduler, generation);
            });

            let delay = core.remaining_on_pause;
            core.schedule = Some(self.scheduler.schedule_once(delay, task)?);
            core.remaining_on_pause = Duration::ZERO;
            core.state = TimerState::Running;
        }
        self.emit(&[TimerEvent::WillResume]);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), CaptureError> {
        {
            let mut core = self.core.lock();
            if core.schedule.is_none() {
                return Err(CaptureError::InvalidState("timer is not running".into()));
            }
            core.reset();
            core.cancel_schedule();
            core.state = TimerState::Stopped;
        }
        self.emit(&[TimerEvent::DidStop]);
        Ok(())
    }

    fn emit(&self, events: &[TimerEvent]) {
        for event in events {
            self.observer.on_timer_event(event);
        }
    }

    fn schedule_ticks(&self, core: &mut TimerCore) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        core.generation += 1;
        Self::repeating(&self.core, &self.observer, &self.scheduler, core)
    }

    fn repeating(
        shared: &Arc<Mutex<TimerCore>>,
        observer: &Arc<dyn TimerObserver>,
        scheduler: &Arc<dyn Scheduler>,
        core: &TimerCore,
    ) -> Result<Box<dyn ScheduledTask>, CaptureError> {
        let generation = core.generation;
        let weak = Arc::downgrade(shared);
        let observer = Arc::clone(observer);
        let task: Task = Arc::new(move || {
            Self::tick(&weak, &observer, generation);
        });
        scheduler.schedule_repeating(core.interval, task)
    }

    fn tick(core: &Weak<Mutex<TimerCore>>, observer: &Arc<dyn TimerObserver>, generation: u64) {
        let Some(core) = core.upgrade() else {
            return;
        };
        let event = {
            let mut core = core.lock();
            if core.generation != generation || core.schedule.is_none() {
                return;
            }
            core.fire()
        };
        observer.on_timer_event(&event);
    }

    /// Continuation of `resume`: the overdue tick fires now, then regular
    /// ticking picks up again.
    fn resume_ticking(
        weak: &Weak<Mutex<TimerCore>>,
        observer: &Arc<dyn TimerObserver>,
        scheduler: &Arc<dyn Scheduler>,
        generation: u64,
    ) {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let event = {
            let mut core = shared.lock();
            if core.generation != generation || core.schedule.is_none() {
                return;
            }
            let event = core.fire();
            if core.state == TimerState::Running {
                core.generation += 1;
                match Self::repeating(&shared, observer, scheduler, &core) {
                    Ok(task) => core.schedule = Some(task),
                    Err(e) => {
                        log::error!("Failed to reschedule deadline timer: {}", e);
                        core.schedule = None;
                    }
                }
            }
            event
        };
        observer.on_timer_event(&event);
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.core.lock().cancel_schedule();
    }
}
