mod synthetic_camera;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use camera_kit_core::storage::paths;
use camera_kit_core::{
    read_container, CaptureConfiguration, CaptureDelegate, CaptureError, ContainerWriterFactory,
    DirectoryLibrary, FlashMode, Frame, OutputMode, RecordingPhase, RecordingResult, RecordingSession,
};
use synthetic_camera::{FrameProducer, SyntheticCamera};

type DemoSession = RecordingSession<SyntheticCamera, ContainerWriterFactory, DirectoryLibrary>;

/// Logs every callback and forwards deadline stops to the main thread.
struct DemoDelegate {
    last_elapsed: Mutex<String>,
    max_duration_tx: Sender<RecordingResult>,
}

impl CaptureDelegate for DemoDelegate {
    fn on_state_changed(&self, state: &RecordingPhase) {
        log::info!("State: {:?}", state);
    }

    fn on_time_updated(&self, elapsed: &str) {
        let mut last = self.last_elapsed.lock();
        // Log once per second.
        if last.get(..5) != elapsed.get(..5) {
            log::info!("Elapsed: {}", elapsed);
        }
        *last = elapsed.to_string();
    }

    fn on_error(&self, error: &CaptureError) {
        log::warn!("[{}] {} ({})", error.code().as_str(), error, error.reason());
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        log::info!(
            "Finished {} after {:.1}s (checksum {})",
            result.file_path.display(),
            result.duration_secs,
            result.checksum.as_deref().unwrap_or("-")
        );
    }

    fn on_max_duration_reached(&self, result: &RecordingResult) {
        let _ = self.max_duration_tx.send(result.clone());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let output_directory = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("camera-kit-demo"));

    // Start from an empty recordings directory.
    let recordings = output_directory.join("recordings");
    fs::create_dir_all(&recordings)?;
    paths::clear_directory(&recordings)?;

    let config = CaptureConfiguration {
        output_directory: recordings,
        max_duration_secs: 3.0,
        flash_mode: FlashMode::Auto,
        write_metadata: true,
        ..Default::default()
    };
    let library = DirectoryLibrary::new(output_directory.join("library"));

    let (max_duration_tx, max_duration_rx) = crossbeam_channel::unbounded();
    let mut session: DemoSession =
        RecordingSession::new(SyntheticCamera, ContainerWriterFactory, library, config)?;
    session.set_delegate(Arc::new(DemoDelegate {
        last_elapsed: Mutex::new(String::new()),
        max_duration_tx,
    }));
    let session = Arc::new(session);

    log::info!("Camera status: {:?}", session.camera_status());

    // Manual stop with a pause in the middle.
    let producer = start_producer(&session)?;
    session.start_recording()?;
    thread::sleep(Duration::from_millis(800));
    session.pause_recording()?;
    thread::sleep(Duration::from_millis(500));
    session.resume_recording()?;
    thread::sleep(Duration::from_millis(700));

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    session.stop_recording(move |result: &RecordingResult| {
        let _ = done_tx.send(result.clone());
    })?;
    let manual = done_rx.recv_timeout(Duration::from_secs(10))?;
    summarize("manual stop", &manual);

    // Let the deadline end the second recording.
    session.start_recording()?;
    let deadline = max_duration_rx.recv_timeout(Duration::from_secs(10))?;
    summarize("max duration", &deadline);
    let pushed = producer.stop();

    session.set_output_mode(OutputMode::StillImage)?;
    let picture = session.capture_picture()?;
    let still_path = paths::temp_file_path(&output_directory, "still", "jpg")?;
    fs::write(&still_path, &picture.image)?;
    log::info!(
        "Picture of {} bytes saved as {}, copy at {}",
        picture.image.len(),
        picture.local_identifier.as_deref().unwrap_or("-"),
        still_path.display()
    );

    let diagnostics = session.diagnostics();
    log::info!(
        "Frames: {} pushed, {} written, {} dropped, {} recordings",
        pushed,
        diagnostics.frames_written,
        diagnostics.frames_dropped,
        diagnostics.recordings_finalized
    );
    Ok(())
}

fn start_producer(session: &Arc<DemoSession>) -> std::io::Result<FrameProducer> {
    let session = Arc::clone(session);
    FrameProducer::start(Arc::new(move |frame: &Frame| session.on_frame(frame)))
}

fn summarize(label: &str, result: &RecordingResult) {
    if let Some(ref error) = result.error {
        log::error!("{}: {}", label, error);
        return;
    }
    match read_container(&result.file_path) {
        Ok((header, records)) => log::info!(
            "{}: {}x{} container with {} frames, {:.1}s, library id {}",
            label,
            header.width,
            header.height,
            records.len(),
            result.duration_secs,
            result.local_identifier.as_deref().unwrap_or("-")
        ),
        Err(e) => log::error!("{}: could not read {}: {}", label, result.file_path.display(), e),
    }
}
