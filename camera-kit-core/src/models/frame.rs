use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A media timestamp or duration with nanosecond resolution.
///
/// Signed so that intermediate arithmetic (offsets, gaps) can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    /// Rational constructor: `value / timescale` seconds.
    pub fn new(value: i64, timescale: i32) -> Self {
        if timescale == 0 {
            return Self::ZERO;
        }
        let nanos = value as i128 * NANOS_PER_SEC as i128 / timescale as i128;
        Self(nanos as i64)
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for MediaTime {
    fn add_assign(&mut self, rhs: MediaTime) {
        *self = *self + rhs;
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for MediaTime {
    fn sub_assign(&mut self, rhs: MediaTime) {
        *self = *self - rhs;
    }
}

impl Neg for MediaTime {
    type Output = MediaTime;

    fn neg(self) -> MediaTime {
        MediaTime(-self.0)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Kind of media a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Timing entry of one sample inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTiming {
    pub duration: MediaTime,
    pub presentation: MediaTime,
    /// Absent for streams without reordering.
    pub decode: Option<MediaTime>,
}

impl SampleTiming {
    pub fn new(presentation: MediaTime, duration: MediaTime) -> Self {
        Self {
            duration,
            presentation,
            decode: None,
        }
    }

    fn shifted_back(&self, offset: MediaTime) -> Self {
        Self {
            duration: self.duration,
            presentation: self.presentation - offset,
            decode: self.decode.map(|dts| dts - offset),
        }
    }
}

/// Audio stream description taken from the first audio frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: f64,
}

/// A timestamped media sample as delivered by a capture output.
///
/// Cloning is cheap: the payload is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: MediaKind,
    pub timings: Vec<SampleTiming>,
    pub audio_format: Option<AudioFormat>,
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn video(presentation: MediaTime, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            kind: MediaKind::Video,
            timings: vec![SampleTiming::new(presentation, MediaTime::ZERO)],
            audio_format: None,
            data: data.into(),
        }
    }

    pub fn audio(
        presentation: MediaTime,
        duration: MediaTime,
        format: AudioFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            kind: MediaKind::Audio,
            timings: vec![SampleTiming::new(presentation, duration)],
            audio_format: Some(format),
            data: data.into(),
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Presentation timestamp of the first sample.
    pub fn presentation_timestamp(&self) -> MediaTime {
        self.timings
            .first()
            .map(|t| t.presentation)
            .unwrap_or(MediaTime::ZERO)
    }

    /// Total duration of all samples in the frame.
    pub fn duration(&self) -> MediaTime {
        self.timings
            .iter()
            .fold(MediaTime::ZERO, |acc, t| acc + t.duration)
    }

    /// Copy of this frame with every timing entry moved `offset` earlier.
    pub fn retimed(&self, offset: MediaTime) -> Frame {
        Frame {
            kind: self.kind,
            timings: self.timings.iter().map(|t| t.shifted_back(offset)).collect(),
            audio_format: self.audio_format,
            data: Arc::clone(&self.data),
        }
    }
}
