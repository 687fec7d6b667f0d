use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::models::config::{CaptureConfiguration, FlashMode, Orientation, OutputMode, OutputQuality};
use crate::models::error::CaptureError;
use crate::models::frame::{AudioFormat, Frame, MediaKind};
use crate::models::recording_result::{RecordingMetadata, RecordingResult, StillImageResult, StopReason};
use crate::models::state::{CameraStatus, RecordingPhase, SessionDiagnostics};
use crate::session::continuity::ContinuityTracker;
use crate::storage::{metadata, paths};
use crate::timer::deadline::{format_elapsed, DeadlineTimer, TimerEvent, TimerState};
use crate::timer::scheduler::{Scheduler, ThreadScheduler};
use crate::traits::camera_device::{Authorization, CameraDevice};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::frame_sink::{FrameSink, FrameSinkFactory, SinkOutput, SinkSpec, SinkStatus};
use crate::traits::media_library::MediaLibrary;

/// Completion handler passed to [`RecordingSession::stop_recording`].
pub type StopCompletion = Box<dyn FnOnce(&RecordingResult) + Send + 'static>;

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    phase: RecordingPhase,
    output_mode: OutputMode,
    orientation: Orientation,
    flash_mode: FlashMode,
    quality: OutputQuality,
    continuity: ContinuityTracker,
    file_index: u32,
    timer: Option<DeadlineTimer>,
    sink: Option<Box<dyn FrameSink>>,
    sink_path: Option<PathBuf>,
    sink_dimensions: (u32, u32),
    sink_audio: Option<AudioFormat>,
    stop_completion: Option<StopCompletion>,
    diagnostics: SessionDiagnostics,
}

impl SessionState {
    fn new(config: &CaptureConfiguration) -> Self {
        Self {
            phase: RecordingPhase::Idle,
            output_mode: config.output_mode,
            orientation: Orientation::default(),
            flash_mode: config.flash_mode,
            quality: config.quality,
            continuity: ContinuityTracker::new(),
            file_index: 0,
            timer: None,
            sink: None,
            sink_path: None,
            sink_dimensions: (config.video_width, config.video_height),
            sink_audio: None,
            stop_completion: None,
            diagnostics: SessionDiagnostics::default(),
        }
    }

    fn timer_state(&self) -> Option<TimerState> {
        self.timer.as_ref().map(|t| t.state())
    }

    fn drop_frame(&mut self) {
        self.diagnostics.frames_dropped += 1;
    }
}

/// Camera recording orchestrator.
///
/// Generic over the camera, the encoder and the media library. Capture
/// outputs push frames in through [`RecordingSession::on_frame`]; the session
/// repairs timestamps across pauses and feeds a lazily created sink:
///
/// ```text
/// [CameraDevice outputs] → on_frame → [ContinuityTracker] → [FrameSink]
///                                                              │ finish
/// [DeadlineTimer] ── TimerEvent ──→ [finalizer thread] ←───────┘
///                                         │
///                                         └→ [MediaLibrary] → CaptureDelegate
/// ```
///
/// All operations take `&self` and serialize on one lock. Delegate callbacks
/// run after that lock is released.
pub struct RecordingSession<D: CameraDevice, F: FrameSinkFactory, L: MediaLibrary> {
    device: Arc<D>,
    sink_factory: Arc<F>,
    library: Arc<L>,
    scheduler: Arc<dyn Scheduler>,
    config: CaptureConfiguration,
    session_state: Arc<Mutex<SessionState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<D, F, L> RecordingSession<D, F, L>
where
    D: CameraDevice + 'static,
    F: FrameSinkFactory + 'static,
    L: MediaLibrary + 'static,
{
    pub fn new(
        device: D,
        sink_factory: F,
        library: L,
        config: CaptureConfiguration,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(Self {
            device: Arc::new(device),
            sink_factory: Arc::new(sink_factory),
            library: Arc::new(library),
            scheduler: Arc::new(ThreadScheduler::new()),
            session_state: Arc::new(Mutex::new(SessionState::new(&config))),
            config,
            delegate: None,
        })
    }

    /// Replace the scheduler driving the deadline timer.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn state(&self) -> RecordingPhase {
        self.session_state.lock().phase
    }

    /// State of the current recording's deadline timer, if one exists.
    pub fn timer_state(&self) -> Option<TimerState> {
        self.session_state.lock().timer_state()
    }

    pub fn has_sink(&self) -> bool {
        self.session_state.lock().sink.is_some()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.session_state.lock().diagnostics.clone()
    }

    pub fn file_index(&self) -> u32 {
        self.session_state.lock().file_index
    }

    /// Path the next (or current) recording is written to.
    pub fn output_path(&self) -> PathBuf {
        let index = self.session_state.lock().file_index;
        paths::recording_path(&self.config.output_directory, index)
    }

    pub fn output_mode(&self) -> OutputMode {
        self.session_state.lock().output_mode
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.session_state.lock().flash_mode
    }

    pub fn quality(&self) -> OutputQuality {
        self.session_state.lock().quality
    }

    pub fn orientation(&self) -> Orientation {
        self.session_state.lock().orientation
    }

    /// Camera availability. `AccessDenied` and `NoDeviceFound` are also
    /// reported through the delegate.
    pub fn camera_status(&self) -> CameraStatus {
        if !self.device.has_camera() {
            self.report(&[CaptureError::CameraUnavailable]);
            return CameraStatus::NoDeviceFound;
        }
        match self.device.authorization() {
            Authorization::Authorized => CameraStatus::Ready,
            Authorization::NotDetermined => CameraStatus::NotDetermined,
            Authorization::Denied => {
                self.report(&[CaptureError::AccessDenied]);
                CameraStatus::AccessDenied
            }
        }
    }

    /// Switch output mode. Only allowed while no recording is in progress.
    pub fn set_output_mode(&self, mode: OutputMode) -> Result<(), CaptureError> {
        let mut s = self.session_state.lock();
        if !s.phase.is_idle() || s.timer.is_some() {
            log::warn!("Rejected output mode change to {:?} while {:?}", mode, s.phase);
            return Err(CaptureError::InvalidState(
                "output mode can only change while idle".into(),
            ));
        }
        s.output_mode = mode;
        Ok(())
    }

    /// Orientation used for the encoder dimensions of the next sink.
    pub fn set_orientation(&self, orientation: Orientation) {
        self.session_state.lock().orientation = orientation;
    }

    /// Advance Off → On → Auto. Applied to the torch immediately while recording.
    pub fn cycle_flash_mode(&self) -> FlashMode {
        let (mode, recording) = {
            let mut s = self.session_state.lock();
            s.flash_mode = s.flash_mode.next();
            (s.flash_mode, s.phase.is_capturing())
        };
        if recording {
            if let Err(e) = self.device.set_torch(mode) {
                log::error!("Failed to switch torch to {:?}: {}", mode, e);
                self.report(&[e]);
            }
        }
        mode
    }

    /// Advance Low → Medium → High. The new value is kept even when the
    /// device cannot apply it; that case is reported as `PresetUnsupported`.
    pub fn cycle_quality(&self) -> OutputQuality {
        let quality = {
            let mut s = self.session_state.lock();
            s.quality = s.quality.next();
            s.quality
        };
        if !self.device.supports_quality(quality) {
            self.report(&[CaptureError::PresetUnsupported(format!(
                "{:?} quality is not supported by this camera",
                quality
            ))]);
        }
        quality
    }

    /// Begin a recording. Transitions: idle → recording.
    pub fn start_recording(&self) -> Result<(), CaptureError> {
        self.ensure_camera()?;

        let (phase, flash_mode) = {
            let mut s = self.session_state.lock();
            if s.output_mode == OutputMode::StillImage {
                return Err(CaptureError::UnsupportedOutputMode(
                    "video recording needs a video output mode".into(),
                ));
            }
            if s.phase.is_capturing() {
                log::warn!("start_recording called while already recording");
                return Err(CaptureError::InvalidState("already recording".into()));
            }
            if s.timer.is_some() {
                log::warn!("start_recording called while the previous recording is finalizing");
                return Err(CaptureError::InvalidState(
                    "previous recording is still finalizing".into(),
                ));
            }

            s.continuity.reset();
            let (events_tx, events_rx) = crossbeam_channel::unbounded();
            self.spawn_finalizer(events_rx)?;

            let timer = DeadlineTimer::new(
                self.config.max_duration_secs,
                Duration::from_secs_f64(self.config.timer_interval_secs),
                Arc::new(events_tx),
                Arc::clone(&self.scheduler),
            );
            timer.start()?;
            s.timer = Some(timer);
            s.phase = RecordingPhase::Recording { duration_secs: 0.0 };
            (s.phase, s.flash_mode)
        };

        if flash_mode != FlashMode::Off {
            if let Err(e) = self.device.set_torch(flash_mode) {
                log::error!("Failed to enable torch: {}", e);
                self.report(&[e]);
            }
        }

        log::info!("Recording started: {}", self.output_path().display());
        self.notify_state(&phase);
        Ok(())
    }

    /// Request a stop. Finalization continues on the session's finalizer
    /// thread and `completion` is called once the file has been persisted.
    pub fn stop_recording(
        &self,
        completion: impl FnOnce(&RecordingResult) + Send + 'static,
    ) -> Result<(), CaptureError> {
        let mut s = self.session_state.lock();
        let Some(timer) = s.timer.as_ref().filter(|t| t.state() == TimerState::Running) else {
            log::warn!("stop_recording called while {:?}", s.phase);
            return Err(CaptureError::InvalidState("no running recording to stop".into()));
        };
        if let Err(e) = timer.stop() {
            log::warn!("stop_recording lost the race against the deadline: {}", e);
            return Err(e);
        }
        s.stop_completion = Some(Box::new(completion));
        log::info!("Recording stop requested");
        Ok(())
    }

    /// Transitions: recording → paused.
    pub fn pause_recording(&self) -> Result<(), CaptureError> {
        let phase = {
            let mut guard = self.session_state.lock();
            let s = &mut *guard;
            let running = s.timer.as_ref().filter(|t| t.state() == TimerState::Running);
            let (Some(timer), RecordingPhase::Recording { duration_secs }) = (running, s.phase) else {
                log::warn!("pause_recording called while {:?}", s.phase);
                return Err(CaptureError::InvalidState("can only pause while recording".into()));
            };
            timer.pause()?;
            s.continuity.mark_discontinuous();
            s.diagnostics.discontinuities += 1;
            s.phase = RecordingPhase::Paused { duration_secs };
            s.phase
        };
        log::info!("Recording paused");
        self.notify_state(&phase);
        Ok(())
    }

    /// Transitions: paused → recording.
    pub fn resume_recording(&self) -> Result<(), CaptureError> {
        let phase = {
            let mut s = self.session_state.lock();
            let paused = s.timer.as_ref().filter(|t| t.state() == TimerState::Paused);
            let (Some(timer), RecordingPhase::Paused { duration_secs }) = (paused, s.phase) else {
                log::warn!("resume_recording called while {:?}", s.phase);
                return Err(CaptureError::InvalidState("can only resume while paused".into()));
            };
            timer.resume()?;
            s.phase = RecordingPhase::Recording { duration_secs };
            s.phase
        };
        log::info!("Recording resumed");
        self.notify_state(&phase);
        Ok(())
    }

    /// Entry point for capture outputs. Frames that cannot be written right
    /// now are dropped.
    pub fn on_frame(&self, frame: &Frame) {
        let mut errors = Vec::new();
        {
            let mut guard = self.session_state.lock();
            self.process_frame(&mut guard, frame, &mut errors);
        }
        self.report(&errors);
    }

    /// Take a still picture and save it to the media library.
    pub fn capture_picture(&self) -> Result<StillImageResult, CaptureError> {
        if self.output_mode() != OutputMode::StillImage {
            let err = CaptureError::UnsupportedOutputMode(
                "can not take a picture outside still image mode".into(),
            );
            self.report(&[err.clone()]);
            return Err(err);
        }
        if !self.camera_status().can_load() {
            let err = CaptureError::NoCaptureSession;
            self.report(&[err.clone()]);
            return Err(err);
        }

        let image = self.device.capture_still().inspect_err(|e| {
            log::error!("Still capture failed: {}", e);
            self.report(&[e.clone()]);
        })?;

        let mut result = StillImageResult {
            image,
            local_identifier: None,
            error: None,
        };
        match self.library.save_image(&result.image) {
            Ok(id) => result.local_identifier = Some(id),
            Err(e) => {
                log::error!("Failed to save picture: {}", e);
                self.report(&[e.clone()]);
                result.error = Some(e);
            }
        }
        Ok(result)
    }

    // --- Internal helpers ---

    fn ensure_camera(&self) -> Result<(), CaptureError> {
        match self.camera_status() {
            CameraStatus::Ready | CameraStatus::NotDetermined => Ok(()),
            CameraStatus::AccessDenied => Err(CaptureError::AccessDenied),
            CameraStatus::NoDeviceFound => Err(CaptureError::CameraUnavailable),
        }
    }

    fn process_frame(&self, s: &mut SessionState, frame: &Frame, errors: &mut Vec<CaptureError>) {
        s.diagnostics.frames_received += 1;

        if !s.phase.is_recording() {
            s.drop_frame();
            return;
        }
        if frame.kind == MediaKind::Audio && !s.output_mode.records_audio() {
            s.drop_frame();
            return;
        }

        let anchor = s.output_mode.anchor_kind();
        if s.sink.is_none() {
            if frame.kind != anchor {
                s.drop_frame();
                return;
            }
            if let Err(e) = self.create_sink(s, frame, errors) {
                log::error!("Failed to create frame sink: {}", e);
                errors.push(e);
                s.drop_frame();
                return;
            }
        }

        let Some(out) = s.continuity.process(frame, anchor) else {
            log::debug!("Dropping {:?} frame during discontinuity", frame.kind);
            s.drop_frame();
            return;
        };

        let Some(sink) = s.sink.as_mut() else {
            s.drop_frame();
            return;
        };
        let was_failed = matches!(sink.status(), SinkStatus::Failed(_));
        match sink.write(&out) {
            Ok(()) => s.diagnostics.frames_written += 1,
            Err(e) => {
                log::error!("Failed to write {:?} frame: {}", frame.kind, e);
                s.diagnostics.write_failures += 1;
                if !was_failed {
                    errors.push(e);
                }
            }
        }
    }

    fn create_sink(
        &self,
        s: &mut SessionState,
        frame: &Frame,
        errors: &mut Vec<CaptureError>,
    ) -> Result<(), CaptureError> {
        let audio = if s.output_mode.records_audio() {
            Some(frame.audio_format.ok_or_else(|| {
                CaptureError::EncodingFailed("first audio frame carries no format".into())
            })?)
        } else {
            None
        };

        let path = paths::recording_path(&self.config.output_directory, s.file_index);
        if let Err(e) = paths::remove_stale(&path) {
            log::error!("Failed to remove stale recording {}: {}", path.display(), e);
            errors.push(e);
        }

        let (width, height) = s
            .orientation
            .encoder_dimensions(self.config.video_width, self.config.video_height);
        let spec = SinkSpec {
            path: path.clone(),
            width,
            height,
            audio,
        };
        let sink = self.sink_factory.create(&spec)?;
        log::debug!("Created {}x{} frame sink at {}", width, height, path.display());

        s.sink = Some(sink);
        s.sink_path = Some(path);
        s.sink_dimensions = (width, height);
        s.sink_audio = audio;
        Ok(())
    }

    fn spawn_finalizer(&self, events: Receiver<TimerEvent>) -> Result<(), CaptureError> {
        let finalizer = Finalizer {
            session_state: Arc::clone(&self.session_state),
            delegate: self.delegate.clone(),
            device: self.device.clone(),
            library: self.library.clone(),
            output_directory: self.config.output_directory.clone(),
            write_metadata: self.config.write_metadata,
        };
        // Detached: the thread may itself drop the last timer handle.
        thread::Builder::new()
            .name("recording-finalizer".into())
            .spawn(move || finalizer.run(events))
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn finalizer thread: {}", e)))?;
        Ok(())
    }

    fn notify_state(&self, phase: &RecordingPhase) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(phase);
        }
    }

    fn report(&self, errors: &[CaptureError]) {
        report_errors(&self.delegate, errors);
    }
}

impl<D: CameraDevice, F: FrameSinkFactory, L: MediaLibrary> Drop for RecordingSession<D, F, L> {
    fn drop(&mut self) {
        // Dropping the timer closes the event channel and lets an idle
        // finalizer thread exit.
        let timer = self.session_state.lock().timer.take();
        drop(timer);
    }
}

fn report_errors(delegate: &Option<Arc<dyn CaptureDelegate>>, errors: &[CaptureError]) {
    if let Some(ref delegate) = delegate {
        for error in errors {
            delegate.on_error(error);
        }
    }
}

/// Consumes deadline timer events for one recording and finalizes it.
struct Finalizer {
    session_state: Arc<Mutex<SessionState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    device: Arc<dyn CameraDevice>,
    library: Arc<dyn MediaLibrary>,
    output_directory: PathBuf,
    write_metadata: bool,
}

impl Finalizer {
    fn run(self, events: Receiver<TimerEvent>) {
        for event in events.iter() {
            match event {
                TimerEvent::DidFire { elapsed_secs } => self.on_tick(elapsed_secs),
                TimerEvent::DidStop => {
                    self.finalize(StopReason::Manual, None);
                    return;
                }
                TimerEvent::DidEnd { elapsed_secs } => {
                    self.on_tick(elapsed_secs);
                    log::info!("Maximum duration reached after {}", format_elapsed(elapsed_secs));
                    self.finalize(StopReason::MaxDuration, Some(elapsed_secs));
                    return;
                }
                TimerEvent::WillStart | TimerEvent::DidPause | TimerEvent::WillResume => {
                    log::debug!("Deadline timer: {:?}", event);
                }
            }
        }
    }

    fn on_tick(&self, elapsed_secs: f64) {
        {
            let mut s = self.session_state.lock();
            if s.phase.is_capturing() {
                s.phase = s.phase.with_duration(elapsed_secs);
            }
        }
        if let Some(ref delegate) = self.delegate {
            delegate.on_time_updated(&format_elapsed(elapsed_secs));
        }
    }

    fn finalize(&self, reason: StopReason, end_secs: Option<f64>) {
        let (sink, path, file_index, completion, duration_secs, dimensions, audio) = {
            let mut s = self.session_state.lock();
            let path = s
                .sink_path
                .take()
                .unwrap_or_else(|| paths::recording_path(&self.output_directory, s.file_index));
            let file_index = s.file_index;
            s.file_index += 1;
            let duration_secs = end_secs.or(s.phase.duration()).unwrap_or(0.0);
            s.phase = RecordingPhase::Finalizing;
            (
                s.sink.take(),
                path,
                file_index,
                s.stop_completion.take(),
                duration_secs,
                s.sink_dimensions,
                s.sink_audio.take(),
            )
        };
        self.notify_state(&RecordingPhase::Finalizing);

        let output = match sink {
            Some(sink) => finish_sink(sink),
            None => Err(CaptureError::EncodingFailed("no frames were recorded".into())),
        };

        let timer = {
            let mut s = self.session_state.lock();
            s.phase = RecordingPhase::Idle;
            s.diagnostics.recordings_finalized += 1;
            s.timer.take()
        };
        drop(timer);

        let mut errors = Vec::new();
        if let Err(e) = self.device.set_torch(FlashMode::Off) {
            log::error!("Failed to turn torch off: {}", e);
            errors.push(e);
        }

        let path_text = path.to_string_lossy().into_owned();
        let mut result = RecordingResult {
            file_path: path.clone(),
            duration_secs,
            stop_reason: reason,
            local_identifier: None,
            checksum: None,
            error: None,
            metadata: RecordingMetadata::new(
                file_index,
                &path_text,
                duration_secs,
                reason,
                dimensions,
                audio,
            ),
        };

        match output {
            Ok(output) => self.persist(&mut result, &output, &mut errors),
            Err(e) => {
                log::error!("Failed to finalize {}: {}", path.display(), e);
                errors.push(e.clone());
                result.error = Some(e);
            }
        }

        log::info!(
            "Recording finished ({:?}, {:.1}s): {}",
            reason,
            duration_secs,
            path.display()
        );
        self.notify_state(&RecordingPhase::Idle);
        report_errors(&self.delegate, &errors);

        if let Some(ref delegate) = self.delegate {
            delegate.on_capture_finished(&result);
        }
        match reason {
            StopReason::Manual => {
                if let Some(completion) = completion {
                    completion(&result);
                }
            }
            StopReason::MaxDuration => {
                if let Some(ref delegate) = self.delegate {
                    delegate.on_max_duration_reached(&result);
                }
            }
        }
    }

    fn persist(&self, result: &mut RecordingResult, output: &SinkOutput, errors: &mut Vec<CaptureError>) {
        result.checksum = Some(output.checksum.clone());
        result.metadata.checksum = Some(output.checksum.clone());

        match self.library.save_video(&output.file_path) {
            Ok(id) => {
                result.local_identifier = Some(id.clone());
                result.metadata.local_identifier = Some(id);
            }
            Err(e) => {
                log::error!("Failed to save {} to the media library: {}", output.file_path.display(), e);
                errors.push(e.clone());
                result.error = Some(e);
            }
        }

        if self.write_metadata {
            if let Err(e) = metadata::write_metadata(&result.metadata, &output.file_path) {
                log::error!("Failed to write metadata sidecar: {}", e);
                errors.push(e.clone());
                result.error.get_or_insert(e);
            }
        }
    }

    fn notify_state(&self, phase: &RecordingPhase) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(phase);
        }
    }
}

/// Finish a sink and block until its callback reports back.
fn finish_sink(sink: Box<dyn FrameSink>) -> Result<SinkOutput, CaptureError> {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    sink.finish(Box::new(move |result| {
        let _ = done_tx.send(result);
    }));
    done_rx
        .recv()
        .unwrap_or_else(|_| Err(CaptureError::EncodingFailed("frame sink dropped its completion".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::MediaTime;
    use crate::timer::scheduler::ManualScheduler;
    use crossbeam_channel::Sender;
    use std::path::Path;

    const WAIT: Duration = Duration::from_secs(5);
    const FORMAT: AudioFormat = AudioFormat {
        channels: 1,
        sample_rate: 44_100.0,
    };

    // --- Test doubles ---

    #[derive(Clone)]
    struct MockDevice {
        has_camera: bool,
        authorization: Authorization,
        unsupported: Option<OutputQuality>,
        torch: Arc<Mutex<Vec<FlashMode>>>,
    }

    impl Default for MockDevice {
        fn default() -> Self {
            Self {
                has_camera: true,
                authorization: Authorization::Authorized,
                unsupported: None,
                torch: Arc::default(),
            }
        }
    }

    impl CameraDevice for MockDevice {
        fn has_camera(&self) -> bool {
            self.has_camera
        }

        fn authorization(&self) -> Authorization {
            self.authorization
        }

        fn supports_quality(&self, quality: OutputQuality) -> bool {
            self.unsupported != Some(quality)
        }

        fn set_torch(&self, mode: FlashMode) -> Result<(), CaptureError> {
            self.torch.lock().push(mode);
            Ok(())
        }

        fn capture_still(&self) -> Result<Vec<u8>, CaptureError> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
    }

    #[derive(Clone, Default)]
    struct MockSinkFactory {
        specs: Arc<Mutex<Vec<SinkSpec>>>,
        frames: Arc<Mutex<Vec<Frame>>>,
    }

    impl FrameSinkFactory for MockSinkFactory {
        fn create(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CaptureError> {
            self.specs.lock().push(spec.clone());
            Ok(Box::new(MockSink {
                path: spec.path.clone(),
                frames: Arc::clone(&self.frames),
                written: 0,
            }))
        }
    }

    struct MockSink {
        path: PathBuf,
        frames: Arc<Mutex<Vec<Frame>>>,
        written: u64,
    }

    impl FrameSink for MockSink {
        fn write(&mut self, frame: &Frame) -> Result<(), CaptureError> {
            self.frames.lock().push(frame.clone());
            self.written += 1;
            Ok(())
        }

        fn status(&self) -> SinkStatus {
            if self.written == 0 {
                SinkStatus::Idle
            } else {
                SinkStatus::Writing
            }
        }

        fn path(&self) -> &Path {
            &self.path
        }

        fn finish(self: Box<Self>, on_complete: crate::traits::frame_sink::FinishCallback) {
            on_complete(Ok(SinkOutput {
                file_path: self.path.clone(),
                checksum: "c0ffee".into(),
                video_frames: 0,
                audio_frames: 0,
            }));
        }
    }

    #[derive(Clone, Default)]
    struct MockLibrary {
        videos: Arc<Mutex<Vec<PathBuf>>>,
        images: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MediaLibrary for MockLibrary {
        fn save_video(&self, path: &Path) -> Result<String, CaptureError> {
            let mut videos = self.videos.lock();
            videos.push(path.to_path_buf());
            Ok(format!("video-{}", videos.len()))
        }

        fn save_image(&self, image: &[u8]) -> Result<String, CaptureError> {
            self.images.lock().push(image.to_vec());
            Ok("image-1".into())
        }
    }

    #[derive(Debug, Clone)]
    enum Event {
        State(RecordingPhase),
        Time(String),
        Error(CaptureError),
        Finished(RecordingResult),
        MaxDuration(RecordingResult),
    }

    struct ChannelDelegate(Sender<Event>);

    impl CaptureDelegate for ChannelDelegate {
        fn on_state_changed(&self, state: &RecordingPhase) {
            let _ = self.0.send(Event::State(*state));
        }

        fn on_time_updated(&self, elapsed: &str) {
            let _ = self.0.send(Event::Time(elapsed.to_string()));
        }

        fn on_error(&self, error: &CaptureError) {
            let _ = self.0.send(Event::Error(error.clone()));
        }

        fn on_capture_finished(&self, result: &RecordingResult) {
            let _ = self.0.send(Event::Finished(result.clone()));
        }

        fn on_max_duration_reached(&self, result: &RecordingResult) {
            let _ = self.0.send(Event::MaxDuration(result.clone()));
        }
    }

    type TestSession = RecordingSession<MockDevice, MockSinkFactory, MockLibrary>;

    struct Harness {
        session: TestSession,
        scheduler: ManualScheduler,
        device: MockDevice,
        sinks: MockSinkFactory,
        library: MockLibrary,
        events: Receiver<Event>,
    }

    fn harness_with(config: CaptureConfiguration, device: MockDevice) -> Harness {
        let scheduler = ManualScheduler::new();
        let sinks = MockSinkFactory::default();
        let library = MockLibrary::default();
        let (tx, events) = crossbeam_channel::unbounded();
        let mut session = RecordingSession::new(device.clone(), sinks.clone(), library.clone(), config)
            .unwrap()
            .with_scheduler(Arc::new(scheduler.clone()));
        session.set_delegate(Arc::new(ChannelDelegate(tx)));
        Harness {
            session,
            scheduler,
            device,
            sinks,
            library,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(test_config(), MockDevice::default())
    }

    fn test_config() -> CaptureConfiguration {
        CaptureConfiguration {
            output_directory: PathBuf::from("/tmp/camera-kit-session-test"),
            ..Default::default()
        }
    }

    fn ms(v: i64) -> MediaTime {
        MediaTime::from_nanos(v * 1_000_000)
    }

    fn audio(pts_ms: i64) -> Frame {
        Frame::audio(ms(pts_ms), ms(20), FORMAT, vec![1u8; 8])
    }

    fn video(pts_ms: i64) -> Frame {
        Frame::video(ms(pts_ms), vec![2u8; 16])
    }

    fn completion_channel() -> (impl FnOnce(&RecordingResult) + Send + 'static, Receiver<RecordingResult>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            move |result: &RecordingResult| {
                let _ = tx.send(result.clone());
            },
            rx,
        )
    }

    fn wait_for<T>(events: &Receiver<Event>, mut pick: impl FnMut(Event) -> Option<T>) -> T {
        loop {
            let event = events
                .recv_timeout(WAIT)
                .expect("timed out waiting for delegate event");
            if let Some(value) = pick(event) {
                return value;
            }
        }
    }

    fn wait_finished(events: &Receiver<Event>) -> RecordingResult {
        wait_for(events, |e| match e {
            Event::Finished(result) => Some(result),
            _ => None,
        })
    }

    // --- Tests ---

    #[test]
    fn records_and_finalizes_once() {
        let h = harness();
        h.session.start_recording().unwrap();
        assert!(h.session.state().is_recording());

        for i in 0..3 {
            h.session.on_frame(&audio(i * 20));
            h.session.on_frame(&video(i * 20 + 5));
        }
        assert_eq!(h.sinks.frames.lock().len(), 6);

        let (completion, done) = completion_channel();
        h.session.stop_recording(completion).unwrap();

        let result = done.recv_timeout(WAIT).unwrap();
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.file_path, PathBuf::from("/tmp/camera-kit-session-test/video0.mp4"));
        assert_eq!(result.stop_reason, StopReason::Manual);
        assert_eq!(result.checksum.as_deref(), Some("c0ffee"));
        assert_eq!(result.local_identifier.as_deref(), Some("video-1"));
        assert!(done.recv_timeout(Duration::from_millis(100)).is_err());

        wait_finished(&h.events);
        assert!(h.session.state().is_idle());
        assert!(!h.session.has_sink());
        assert_eq!(h.session.timer_state(), None);
        assert_eq!(h.session.file_index(), 1);
        assert_eq!(h.library.videos.lock().len(), 1);
        assert_eq!(h.session.diagnostics().recordings_finalized, 1);
    }

    #[test]
    fn sink_is_created_on_first_audio_frame_with_portrait_dimensions() {
        let h = harness();
        h.session.start_recording().unwrap();

        // Video before any audio cannot start the writer.
        h.session.on_frame(&video(0));
        assert!(!h.session.has_sink());

        h.session.on_frame(&audio(10));
        let specs = h.sinks.specs.lock().clone();
        assert_eq!(specs.len(), 1);
        assert_eq!((specs[0].width, specs[0].height), (720, 1280));
        assert_eq!(specs[0].audio, Some(FORMAT));
        assert_eq!(h.session.diagnostics().frames_dropped, 1);
    }

    #[test]
    fn stale_file_removal_failure_is_reported_and_recording_continues() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("video0.mp4");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("leftover"), b"x").unwrap();

        let config = CaptureConfiguration {
            output_directory: dir.path().to_path_buf(),
            ..test_config()
        };
        let h = harness_with(config, MockDevice::default());
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));

        let error = wait_for(&h.events, |e| match e {
            Event::Error(error) => Some(error),
            _ => None,
        });
        assert!(matches!(error, CaptureError::StorageError(_)), "{:?}", error);
        assert!(h.session.has_sink());
        assert_eq!(h.sinks.specs.lock()[0].path, blocked);
        assert_eq!(h.sinks.frames.lock().len(), 1);
    }

    #[test]
    fn infinite_max_duration_is_rejected_at_construction() {
        let config = CaptureConfiguration {
            max_duration_secs: f64::INFINITY,
            timer_interval_secs: 1e300,
            ..test_config()
        };
        let created: Result<TestSession, CaptureError> = RecordingSession::new(
            MockDevice::default(),
            MockSinkFactory::default(),
            MockLibrary::default(),
            config,
        );
        assert!(matches!(created, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn landscape_keeps_sensor_dimensions() {
        let h = harness();
        h.session.set_orientation(Orientation::LandscapeRight);
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));
        let spec = h.sinks.specs.lock()[0].clone();
        assert_eq!((spec.width, spec.height), (1280, 720));
    }

    #[test]
    fn frames_during_discontinuity_are_dropped_and_retimed() {
        let h = harness();
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));
        h.session.on_frame(&video(10));

        h.session.pause_recording().unwrap();
        // Paused: nothing reaches the sink.
        h.session.on_frame(&audio(1_000));
        h.session.resume_recording().unwrap();

        h.session.on_frame(&video(2_000));
        h.session.on_frame(&audio(2_020));
        h.session.on_frame(&video(2_030));

        let frames = h.sinks.frames.lock().clone();
        let pts: Vec<_> = frames.iter().map(|f| f.presentation_timestamp()).collect();
        assert_eq!(pts, vec![ms(0), ms(10), ms(20), ms(30)]);
        assert_eq!(frames[2].kind, MediaKind::Audio);

        let diagnostics = h.session.diagnostics();
        assert_eq!(diagnostics.frames_written, 4);
        assert_eq!(diagnostics.frames_dropped, 2);
        assert_eq!(diagnostics.discontinuities, 1);
    }

    #[test]
    fn second_stop_is_rejected_and_completion_fires_once() {
        let h = harness();
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));

        let (first, first_done) = completion_channel();
        let (second, second_done) = completion_channel();
        h.session.stop_recording(first).unwrap();
        let err = h.session.stop_recording(second).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidState(_)));

        first_done.recv_timeout(WAIT).unwrap();
        wait_finished(&h.events);
        assert!(second_done.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(h.library.videos.lock().len(), 1);
    }

    #[test]
    fn deadline_finalizes_with_max_duration() {
        let config = CaptureConfiguration {
            max_duration_secs: 1.0,
            timer_interval_secs: 0.5,
            ..test_config()
        };
        let h = harness_with(config, MockDevice::default());
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));

        h.scheduler.advance(Duration::from_millis(1_000));

        let mut ticks = Vec::new();
        let result = wait_for(&h.events, |e| match e {
            Event::Time(t) => {
                ticks.push(t);
                None
            }
            Event::MaxDuration(result) => Some(result),
            _ => None,
        });
        assert_eq!(ticks, vec!["00:00.5", "00:01.0"]);
        assert_eq!(result.stop_reason, StopReason::MaxDuration);
        assert_eq!(result.duration_secs, 1.0);
        assert!(h.session.state().is_idle());

        // The deadline already stopped the recording.
        let (completion, _) = completion_channel();
        assert!(h.session.stop_recording(completion).is_err());
    }

    #[test]
    fn stop_without_frames_reports_encoding_failure() {
        let h = harness();
        h.session.start_recording().unwrap();
        let (completion, done) = completion_channel();
        h.session.stop_recording(completion).unwrap();

        let result = done.recv_timeout(WAIT).unwrap();
        assert!(matches!(result.error, Some(CaptureError::EncodingFailed(_))));
        assert!(h.library.videos.lock().is_empty());
        assert_eq!(h.session.file_index(), 1);
    }

    #[test]
    fn next_recording_uses_next_file_index() {
        let h = harness();
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));
        let (completion, done) = completion_channel();
        h.session.stop_recording(completion).unwrap();
        done.recv_timeout(WAIT).unwrap();
        wait_finished(&h.events);

        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));
        let specs = h.sinks.specs.lock().clone();
        assert_eq!(specs[1].path, PathBuf::from("/tmp/camera-kit-session-test/video1.mp4"));
    }

    #[test]
    fn misuse_is_rejected_without_state_change() {
        let h = harness();
        assert!(matches!(
            h.session.pause_recording(),
            Err(CaptureError::InvalidState(_))
        ));
        let (completion, _) = completion_channel();
        assert!(h.session.stop_recording(completion).is_err());

        h.session.start_recording().unwrap();
        assert!(h.session.start_recording().is_err());
        assert!(h.session.resume_recording().is_err());
        assert!(h.session.state().is_recording());

        h.session.pause_recording().unwrap();
        assert!(h.session.pause_recording().is_err());
        let (completion, _) = completion_channel();
        assert!(h.session.stop_recording(completion).is_err());
        assert!(h.session.state().is_paused());
        assert!(h.session.set_output_mode(OutputMode::VideoOnly).is_err());
    }

    #[test]
    fn video_only_mode_drops_audio_and_anchors_on_video() {
        let h = harness();
        h.session.set_output_mode(OutputMode::VideoOnly).unwrap();
        h.session.start_recording().unwrap();

        h.session.on_frame(&audio(0));
        assert!(!h.session.has_sink());
        h.session.on_frame(&video(0));
        h.session.on_frame(&video(33));

        h.session.pause_recording().unwrap();
        h.session.resume_recording().unwrap();
        h.session.on_frame(&video(1_066));

        let spec = h.sinks.specs.lock()[0].clone();
        assert_eq!(spec.audio, None);
        let pts: Vec<_> = h
            .sinks
            .frames
            .lock()
            .iter()
            .map(|f| f.presentation_timestamp())
            .collect();
        assert_eq!(pts, vec![ms(0), ms(33), ms(66)]);
    }

    #[test]
    fn still_image_mode_rejects_recording_and_takes_pictures() {
        let h = harness();
        assert!(h.session.capture_picture().is_err());

        h.session.set_output_mode(OutputMode::StillImage).unwrap();
        assert!(matches!(
            h.session.start_recording(),
            Err(CaptureError::UnsupportedOutputMode(_))
        ));

        let picture = h.session.capture_picture().unwrap();
        assert_eq!(picture.local_identifier.as_deref(), Some("image-1"));
        assert_eq!(h.library.images.lock()[0], vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn camera_status_reports_capability_errors() {
        let denied = MockDevice {
            authorization: Authorization::Denied,
            ..Default::default()
        };
        let h = harness_with(test_config(), denied);
        assert_eq!(h.session.camera_status(), CameraStatus::AccessDenied);
        let err = wait_for(&h.events, |e| match e {
            Event::Error(err) => Some(err),
            _ => None,
        });
        assert_eq!(err, CaptureError::AccessDenied);
        assert!(matches!(
            h.session.start_recording(),
            Err(CaptureError::AccessDenied)
        ));

        let missing = MockDevice {
            has_camera: false,
            ..Default::default()
        };
        let h = harness_with(test_config(), missing);
        assert_eq!(h.session.camera_status(), CameraStatus::NoDeviceFound);
        assert!(matches!(
            h.session.capture_picture(),
            Err(CaptureError::UnsupportedOutputMode(_))
        ));
    }

    #[test]
    fn cycling_quality_reports_unsupported_preset() {
        let device = MockDevice {
            unsupported: Some(OutputQuality::Low),
            ..Default::default()
        };
        let h = harness_with(test_config(), device);
        assert_eq!(h.session.cycle_quality(), OutputQuality::Low);
        assert_eq!(h.session.quality(), OutputQuality::Low);
        let err = wait_for(&h.events, |e| match e {
            Event::Error(err) => Some(err),
            _ => None,
        });
        assert!(matches!(err, CaptureError::PresetUnsupported(_)));
    }

    #[test]
    fn torch_follows_flash_mode_and_turns_off_after_recording() {
        let h = harness();
        assert_eq!(h.session.cycle_flash_mode(), FlashMode::On);
        h.session.start_recording().unwrap();
        h.session.on_frame(&audio(0));
        let (completion, done) = completion_channel();
        h.session.stop_recording(completion).unwrap();
        done.recv_timeout(WAIT).unwrap();

        assert_eq!(*h.device.torch.lock(), vec![FlashMode::On, FlashMode::Off]);
    }

    #[test]
    fn ticks_update_recording_duration() {
        let h = harness();
        h.session.start_recording().unwrap();
        h.scheduler.advance(Duration::from_millis(100));
        let ticks: Vec<String> = (0..2)
            .map(|_| {
                wait_for(&h.events, |e| match e {
                    Event::Time(t) => Some(t),
                    _ => None,
                })
            })
            .collect();
        assert_eq!(ticks, vec!["00:00.0", "00:00.1"]);
        assert_eq!(h.session.state().duration(), Some(0.1));
    }
}
