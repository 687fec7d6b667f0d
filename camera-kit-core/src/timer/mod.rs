pub mod deadline;
pub mod scheduler;

pub use deadline::{format_elapsed, DeadlineTimer, TimerEvent, TimerObserver, TimerState};
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, ThreadScheduler};
