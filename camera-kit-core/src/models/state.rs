/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → recording ↔ paused
///            ↓
///       finalizing → idle
/// ```
///
/// `recording` and `paused` together make up "capturing". A stop is only
/// accepted from `recording`; the deadline can end a recording from either.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordingPhase {
    Idle,
    Recording { duration_secs: f64 },
    Paused { duration_secs: f64 },
    Finalizing,
}

impl RecordingPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Recording or paused: a sink may exist and a timer is active.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Recording { .. } | Self::Paused { .. })
    }

    /// Returns the current duration if in a state that tracks it.
    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Recording { duration_secs } | Self::Paused { duration_secs } => {
                Some(*duration_secs)
            }
            _ => None,
        }
    }

    pub(crate) fn with_duration(self, secs: f64) -> Self {
        match self {
            Self::Recording { .. } => Self::Recording { duration_secs: secs },
            Self::Paused { .. } => Self::Paused { duration_secs: secs },
            other => other,
        }
    }
}

/// Availability of the camera as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Ready,
    NotDetermined,
    AccessDenied,
    NoDeviceFound,
}

impl CameraStatus {
    /// Whether a capture session may be set up in this status.
    pub fn can_load(&self) -> bool {
        matches!(self, Self::Ready | Self::NotDetermined)
    }
}

/// Frame counters for one session, across recordings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub frames_received: u64,
    pub frames_written: u64,
    /// Frames that arrived while not recording, for a missing track, or
    /// during a discontinuity.
    pub frames_dropped: u64,
    pub write_failures: u64,
    /// Pauses after which the timeline was resynced.
    pub discontinuities: u64,
    pub recordings_finalized: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_covers_recording_and_paused() {
        assert!(RecordingPhase::Recording { duration_secs: 0.0 }.is_capturing());
        assert!(RecordingPhase::Paused { duration_secs: 1.0 }.is_capturing());
        assert!(!RecordingPhase::Finalizing.is_capturing());
        assert!(!RecordingPhase::Idle.is_capturing());
    }

    #[test]
    fn with_duration_only_updates_tracking_states() {
        let paused = RecordingPhase::Paused { duration_secs: 1.0 }.with_duration(2.5);
        assert_eq!(paused.duration(), Some(2.5));
        assert_eq!(RecordingPhase::Idle.with_duration(3.0), RecordingPhase::Idle);
    }
}
