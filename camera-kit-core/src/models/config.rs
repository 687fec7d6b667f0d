use std::path::PathBuf;

use super::frame::MediaKind;

/// What the capture session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputMode {
    StillImage,
    VideoOnly,
    VideoWithMic,
}

impl OutputMode {
    pub fn records_video(&self) -> bool {
        !matches!(self, Self::StillImage)
    }

    pub fn records_audio(&self) -> bool {
        matches!(self, Self::VideoWithMic)
    }

    /// Track whose timestamps drive offset recalculation after a pause.
    pub fn anchor_kind(&self) -> MediaKind {
        if self.records_audio() {
            MediaKind::Audio
        } else {
            MediaKind::Video
        }
    }
}

/// Session preset quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputQuality {
    Low,
    Medium,
    High,
}

impl OutputQuality {
    /// Next value in the Low → Medium → High cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// Flash / torch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashMode {
    Off,
    On,
    Auto,
}

impl FlashMode {
    /// Next value in the Off → On → Auto cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Auto,
            Self::Auto => Self::Off,
        }
    }
}

/// Physical device orientation, as far as encoder dimensions care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl Orientation {
    /// Encoder `(width, height)` for a sensor delivering `width`×`height`.
    ///
    /// Portrait recordings swap the two.
    pub fn encoder_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::Portrait => (height, width),
            _ => (width, height),
        }
    }
}

/// Configuration for a recording session.
#[derive(Debug, Clone)]
pub struct CaptureConfiguration {
    /// Directory where `video<index>.mp4` files are written.
    pub output_directory: PathBuf,

    /// Maximum recording duration in seconds (default: 9).
    pub max_duration_secs: f64,

    /// Deadline timer tick interval in seconds (default: 0.05).
    pub timer_interval_secs: f64,

    /// Initial output mode (default: video with microphone).
    pub output_mode: OutputMode,

    /// Sensor frame width in pixels.
    pub video_width: u32,

    /// Sensor frame height in pixels.
    pub video_height: u32,

    pub quality: OutputQuality,

    pub flash_mode: FlashMode,

    /// Write a `.metadata.json` sidecar next to each finished recording.
    pub write_metadata: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_duration_secs > 0.0) {
            return Err("max duration must be positive".into());
        }
        if !self.max_duration_secs.is_finite() {
            return Err("max duration must be finite".into());
        }
        if !(self.timer_interval_secs > 0.0) {
            return Err("timer interval must be positive".into());
        }
        if !self.timer_interval_secs.is_finite() {
            return Err("timer interval must be finite".into());
        }
        if self.timer_interval_secs > self.max_duration_secs {
            return Err(format!(
                "timer interval {}s exceeds max duration {}s",
                self.timer_interval_secs, self.max_duration_secs
            ));
        }
        if self.video_width == 0 || self.video_height == 0 {
            return Err(format!(
                "unsupported video dimensions: {}x{}",
                self.video_width, self.video_height
            ));
        }
        Ok(())
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            max_duration_secs: 9.0,
            timer_interval_secs: 0.05,
            output_mode: OutputMode::VideoWithMic,
            video_width: 1280,
            video_height: 720,
            quality: OutputQuality::High,
            flash_mode: FlashMode::Off,
            write_metadata: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_durations() {
        let config = CaptureConfiguration {
            max_duration_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfiguration {
            timer_interval_secs: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_interval_longer_than_deadline() {
        let config = CaptureConfiguration {
            max_duration_secs: 1.0,
            timer_interval_secs: 2.0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("exceeds"));
    }

    #[test]
    fn rejects_non_finite_durations() {
        let config = CaptureConfiguration {
            max_duration_secs: f64::INFINITY,
            timer_interval_secs: 1e300,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("finite"));

        let config = CaptureConfiguration {
            timer_interval_secs: f64::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cycles_wrap_around() {
        assert_eq!(FlashMode::Auto.next(), FlashMode::Off);
        assert_eq!(OutputQuality::High.next(), OutputQuality::Low);
        assert_eq!(OutputQuality::Low.next().next(), OutputQuality::High);
    }

    #[test]
    fn portrait_swaps_encoder_dimensions() {
        assert_eq!(Orientation::Portrait.encoder_dimensions(1280, 720), (720, 1280));
        assert_eq!(Orientation::LandscapeLeft.encoder_dimensions(1280, 720), (1280, 720));
    }

    #[test]
    fn anchor_track_follows_output_mode() {
        assert_eq!(OutputMode::VideoWithMic.anchor_kind(), MediaKind::Audio);
        assert_eq!(OutputMode::VideoOnly.anchor_kind(), MediaKind::Video);
        assert!(!OutputMode::StillImage.records_video());
    }
}
