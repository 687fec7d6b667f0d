use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};

use camera_kit_core::{
    AudioFormat, Authorization, CameraDevice, CaptureError, FlashMode, Frame, MediaTime, OutputQuality,
};

const VIDEO_INTERVAL: Duration = Duration::from_micros(33_333);
const AUDIO_INTERVAL: Duration = Duration::from_millis(20);

pub const AUDIO_FORMAT: AudioFormat = AudioFormat {
    channels: 1,
    sample_rate: 44_100.0,
};

/// Camera that is always present and authorized.
pub struct SyntheticCamera;

impl CameraDevice for SyntheticCamera {
    fn has_camera(&self) -> bool {
        true
    }

    fn authorization(&self) -> Authorization {
        Authorization::Authorized
    }

    fn supports_quality(&self, quality: OutputQuality) -> bool {
        quality != OutputQuality::Low
    }

    fn set_torch(&self, mode: FlashMode) -> Result<(), CaptureError> {
        log::info!("Torch: {:?}", mode);
        Ok(())
    }

    fn capture_still(&self) -> Result<Vec<u8>, CaptureError> {
        // JPEG SOI / EOI markers around a dummy body.
        let mut image = vec![0xFF, 0xD8];
        image.extend_from_slice(&[0x42; 64]);
        image.extend_from_slice(&[0xFF, 0xD9]);
        Ok(image)
    }
}

/// Pushes video and audio frames stamped with wall-clock time, the way
/// capture outputs keep delivering while a recording is paused.
pub struct FrameProducer {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<u64>,
}

impl FrameProducer {
    pub fn start(sink: Arc<dyn Fn(&Frame) + Send + Sync>) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new().name("frame-producer".into()).spawn(move || {
            let origin = Instant::now();
            let mut next_video = origin;
            let mut next_audio = origin;
            let mut produced = 0u64;

            loop {
                let deadline = next_video.min(next_audio);
                match stop_rx.recv_deadline(deadline) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                let pts = MediaTime::from_nanos(origin.elapsed().as_nanos() as i64);
                if Instant::now() >= next_audio {
                    let duration = MediaTime::from_nanos(AUDIO_INTERVAL.as_nanos() as i64);
                    sink(&Frame::audio(pts, duration, AUDIO_FORMAT, vec![0u8; 1_764]));
                    next_audio += AUDIO_INTERVAL;
                    produced += 1;
                }
                if Instant::now() >= next_video {
                    sink(&Frame::video(pts, vec![0x80u8; 4_096]));
                    next_video += VIDEO_INTERVAL;
                    produced += 1;
                }
            }
            produced
        })?;
        Ok(Self { stop_tx, handle })
    }

    /// Stop producing; returns how many frames were pushed.
    pub fn stop(self) -> u64 {
        let _ = self.stop_tx.send(());
        self.handle.join().unwrap_or(0)
    }
}
