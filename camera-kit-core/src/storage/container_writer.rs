use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::frame::{AudioFormat, Frame, MediaKind, MediaTime, SampleTiming};
use crate::traits::frame_sink::{FinishCallback, FrameSink, FrameSinkFactory, SinkOutput, SinkSpec, SinkStatus};

pub const CONTAINER_MAGIC: &[u8; 4] = b"CKMV";
pub const CONTAINER_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 36;

const FLAG_AUDIO: u16 = 0x0001;
const FRAME_COUNT_OFFSET: u64 = 24;
const START_PTS_OFFSET: u64 = 28;
const NO_DECODE_TIME: i64 = i64::MIN;

/// Streaming writer for the camera-kit movie container.
///
/// ## File Format
///
/// ```text
/// [36-byte header]
///   magic "CKMV" | version u16 | flags u16 (bit 0 = audio track)
///   width u32 | height u32 | channels u16 | reserved u16 | sample rate u32
///   frame count u32 | start pts i64 (ns)      ← patched on finish
/// [Record 1: kind u8 | timing count u16 | (pts i64, dts i64, duration i64)…
///            | payload length u32 | payload]
/// [Record 2: ...]
/// ```
///
/// All integers are little-endian. A missing decode time is stored as `i64::MIN`.
pub struct ContainerWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    has_audio: bool,
    status: SinkStatus,
    start_pts: Option<MediaTime>,
    video_frames: u64,
    audio_frames: u64,
}

impl ContainerWriter {
    /// Create the file (and its directory) and write the initial header.
    pub fn create(spec: &SinkSpec) -> Result<Self, CaptureError> {
        if let Some(parent) = spec.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&spec.path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);
        file.write_all(&encode_header(spec))
            .map_err(|e| CaptureError::StorageError(format!("failed to write header: {}", e)))?;

        Ok(Self {
            path: spec.path.clone(),
            file: Some(file),
            has_audio: spec.audio.is_some(),
            status: SinkStatus::Idle,
            start_pts: None,
            video_frames: 0,
            audio_frames: 0,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.video_frames + self.audio_frames
    }

    /// Presentation time of the first accepted frame.
    pub fn start_pts(&self) -> Option<MediaTime> {
        self.start_pts
    }

    fn fail(&mut self, error: CaptureError) -> CaptureError {
        self.status = SinkStatus::Failed(error.clone());
        error
    }

    /// Patch the header, flush and checksum. Runs on the finish thread.
    fn finalize(mut self) -> Result<SinkOutput, CaptureError> {
        if let SinkStatus::Failed(e) = &self.status {
            return Err(e.clone());
        }
        let Some(start_pts) = self.start_pts else {
            return Err(CaptureError::EncodingFailed("no frames were written".into()));
        };
        let writer = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        let mut file = writer
            .into_inner()
            .map_err(|e| CaptureError::StorageError(format!("flush failed: {}", e.error())))?;

        let frame_count = u32::try_from(self.frame_count()).map_err(|_| {
            CaptureError::EncodingFailed(format!("too many frames: {}", self.frame_count()))
        })?;
        file.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&frame_count.to_le_bytes())
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;

        file.seek(SeekFrom::Start(START_PTS_OFFSET))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&start_pts.as_nanos().to_le_bytes())
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;

        file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        drop(file);

        let checksum = sha256_file(&self.path)?;
        Ok(SinkOutput {
            file_path: self.path.clone(),
            checksum,
            video_frames: self.video_frames,
            audio_frames: self.audio_frames,
        })
    }
}

impl FrameSink for ContainerWriter {
    fn write(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if let SinkStatus::Failed(e) = &self.status {
            return Err(e.clone());
        }
        if frame.kind == MediaKind::Audio && !self.has_audio {
            return Err(CaptureError::EncodingFailed(
                "container has no audio track".into(),
            ));
        }

        let record = encode_record(frame)?;
        let Some(file) = self.file.as_mut() else {
            return Err(CaptureError::StorageError("file is not open".into()));
        };
        if let Err(e) = file.write_all(&record) {
            return Err(self.fail(CaptureError::StorageError(format!("write failed: {}", e))));
        }

        if self.start_pts.is_none() {
            self.start_pts = Some(frame.presentation_timestamp());
            self.status = SinkStatus::Writing;
        }
        match frame.kind {
            MediaKind::Video => self.video_frames += 1,
            MediaKind::Audio => self.audio_frames += 1,
        }
        Ok(())
    }

    fn status(&self) -> SinkStatus {
        self.status.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(self: Box<Self>, on_complete: FinishCallback) {
        // Shared so the callback still fires if the thread cannot be spawned.
        let callback = Arc::new(Mutex::new(Some(on_complete)));
        let thread_callback = Arc::clone(&callback);

        let spawned = thread::Builder::new()
            .name("frame-sink-finish".into())
            .spawn(move || {
                let result = (*self).finalize();
                if let Some(on_complete) = thread_callback.lock().take() {
                    on_complete(result);
                }
            });

        if let Err(e) = spawned {
            log::error!("Failed to spawn finish thread: {}", e);
            if let Some(on_complete) = callback.lock().take() {
                on_complete(Err(CaptureError::Unknown(format!(
                    "failed to spawn finish thread: {}",
                    e
                ))));
            }
        }
    }
}

/// Creates a [`ContainerWriter`] per recording.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerWriterFactory;

impl FrameSinkFactory for ContainerWriterFactory {
    fn create(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CaptureError> {
        Ok(Box::new(ContainerWriter::create(spec)?))
    }
}

fn encode_header(spec: &SinkSpec) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_SIZE);
    let flags = if spec.audio.is_some() { FLAG_AUDIO } else { 0 };
    let (channels, sample_rate) = spec
        .audio
        .map(|a| (a.channels, a.sample_rate.round() as u32))
        .unwrap_or((0, 0));

    header.extend_from_slice(CONTAINER_MAGIC);
    header.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    header.extend_from_slice(&flags.to_le_bytes());
    header.extend_from_slice(&spec.width.to_le_bytes());
    header.extend_from_slice(&spec.height.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes()); // frame count, patched on finish
    header.extend_from_slice(&0i64.to_le_bytes()); // start pts, patched on finish
    header
}

fn encode_record(frame: &Frame) -> Result<Vec<u8>, CaptureError> {
    let timing_count = u16::try_from(frame.timings.len()).map_err(|_| {
        CaptureError::EncodingFailed(format!("too many sample timings: {}", frame.timings.len()))
    })?;
    let data_len = u32::try_from(frame.data.len()).map_err(|_| {
        CaptureError::EncodingFailed(format!("frame payload too large: {} bytes", frame.data.len()))
    })?;

    let mut record = Vec::with_capacity(7 + frame.timings.len() * 24 + frame.data.len());
    record.push(match frame.kind {
        MediaKind::Video => 0,
        MediaKind::Audio => 1,
    });
    record.extend_from_slice(&timing_count.to_le_bytes());
    for timing in &frame.timings {
        let dts = timing.decode.map(|t| t.as_nanos()).unwrap_or(NO_DECODE_TIME);
        record.extend_from_slice(&timing.presentation.as_nanos().to_le_bytes());
        record.extend_from_slice(&dts.to_le_bytes());
        record.extend_from_slice(&timing.duration.as_nanos().to_le_bytes());
    }
    record.extend_from_slice(&data_len.to_le_bytes());
    record.extend_from_slice(&frame.data);
    Ok(record)
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data =
        fs::read(path).map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// --- Reading ---

/// Parsed container header.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHeader {
    pub version: u16,
    pub width: u32,
    pub height: u32,
    pub audio: Option<AudioFormat>,
    pub frame_count: u32,
    pub start_pts: MediaTime,
}

/// A frame record as stored in the container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRecord {
    pub kind: MediaKind,
    pub timings: Vec<SampleTiming>,
    pub payload: Vec<u8>,
}

/// Read a whole container file back.
pub fn read_container(path: &Path) -> Result<(ContainerHeader, Vec<ContainerRecord>), CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read container: {}", e)))?;
    let mut reader = ByteReader { data: &data, pos: 0 };

    if reader.take(4)? != CONTAINER_MAGIC {
        return Err(CaptureError::StorageError("not a camera-kit container".into()));
    }
    let version = reader.u16()?;
    let flags = reader.u16()?;
    let width = reader.u32()?;
    let height = reader.u32()?;
    let channels = reader.u16()?;
    let _reserved = reader.u16()?;
    let sample_rate = reader.u32()?;
    let frame_count = reader.u32()?;
    let start_pts = MediaTime::from_nanos(reader.i64()?);

    let audio = (flags & FLAG_AUDIO != 0).then_some(AudioFormat {
        channels,
        sample_rate: sample_rate as f64,
    });
    let header = ContainerHeader {
        version,
        width,
        height,
        audio,
        frame_count,
        start_pts,
    };

    let mut records = Vec::new();
    while !reader.is_empty() {
        let kind = match reader.u8()? {
            0 => MediaKind::Video,
            1 => MediaKind::Audio,
            other => {
                return Err(CaptureError::StorageError(format!("unknown record kind {}", other)));
            }
        };
        let count = reader.u16()?;
        let mut timings = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let presentation = MediaTime::from_nanos(reader.i64()?);
            let dts = reader.i64()?;
            let duration = MediaTime::from_nanos(reader.i64()?);
            timings.push(SampleTiming {
                duration,
                presentation,
                decode: (dts != NO_DECODE_TIME).then(|| MediaTime::from_nanos(dts)),
            });
        }
        let len = reader.u32()? as usize;
        let payload = reader.take(len)?.to_vec();
        records.push(ContainerRecord {
            kind,
            timings,
            payload,
        });
    }

    Ok((header, records))
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CaptureError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(CaptureError::StorageError("container is truncated".into()));
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CaptureError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CaptureError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CaptureError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CaptureError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CaptureError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
