//! # camera-kit-core
//!
//! Platform-agnostic camera recording core library.
//!
//! Provides the recording state machine, a pausable deadline timer,
//! timestamp continuity across pauses, and a reference container writer.
//! Platform backends implement `CameraDevice`, `FrameSinkFactory` and
//! `MediaLibrary` and plug into the generic `RecordingSession`.
//!
//! ## Architecture
//!
//! ```text
//! camera-kit-core (this crate)
//! ├── traits/    ← CameraDevice, FrameSink, FrameSinkFactory, MediaLibrary, CaptureDelegate
//! ├── models/    ← CaptureError, RecordingPhase, CaptureConfiguration, Frame, MediaTime, etc.
//! ├── timer/     ← DeadlineTimer, Scheduler (thread-backed and manual)
//! ├── session/   ← RecordingSession (generic orchestrator), ContinuityTracker
//! └── storage/   ← ContainerWriter, DirectoryLibrary, metadata sidecars, output paths
//! ```

pub mod models;
pub mod session;
pub mod storage;
pub mod timer;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{CaptureConfiguration, FlashMode, Orientation, OutputMode, OutputQuality};
pub use models::error::{CaptureError, ErrorCode};
pub use models::frame::{AudioFormat, Frame, MediaKind, MediaTime, SampleTiming};
pub use models::recording_result::{RecordingMetadata, RecordingResult, StillImageResult, StopReason};
pub use models::state::{CameraStatus, RecordingPhase, SessionDiagnostics};
pub use session::continuity::ContinuityTracker;
pub use session::recording::{RecordingSession, StopCompletion};
pub use storage::container_writer::{read_container, ContainerWriter, ContainerWriterFactory};
pub use storage::library::DirectoryLibrary;
pub use timer::deadline::{format_elapsed, DeadlineTimer, TimerEvent, TimerObserver, TimerState};
pub use timer::scheduler::{ManualScheduler, Scheduler, ThreadScheduler};
pub use traits::camera_device::{Authorization, CameraDevice};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::frame_sink::{FinishCallback, FrameSink, FrameSinkFactory, SinkOutput, SinkSpec, SinkStatus};
pub use traits::media_library::MediaLibrary;
