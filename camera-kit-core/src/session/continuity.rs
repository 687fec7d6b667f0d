use crate::models::frame::{Frame, MediaKind, MediaTime};

/// Keeps the written timeline gap-free across pauses.
///
/// While paused, capture outputs keep delivering frames with wall-clock
/// timestamps. After a resume the first frame of the anchor track measures
/// how long the pause lasted and that gap is added to a cumulative offset
/// subtracted from every subsequent frame.
#[derive(Debug, Clone, Default)]
pub struct ContinuityTracker {
    discontinuous: bool,
    time_offset: MediaTime,
    last_anchor_end: Option<MediaTime>,
    last_anchor_pts: Option<MediaTime>,
    anchor_interval: MediaTime,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything from a previous recording.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Mark a pause; frames are held back until the anchor track resyncs.
    pub fn mark_discontinuous(&mut self) {
        self.discontinuous = true;
    }

    pub fn is_discontinuous(&self) -> bool {
        self.discontinuous
    }

    /// Total time removed from the timeline so far.
    pub fn time_offset(&self) -> MediaTime {
        self.time_offset
    }

    pub fn last_anchor_end(&self) -> Option<MediaTime> {
        self.last_anchor_end
    }

    /// Returns the frame as it should be written, or `None` to drop it.
    pub fn process(&mut self, frame: &Frame, anchor: MediaKind) -> Option<Frame> {
        let is_anchor = frame.kind == anchor;

        if self.discontinuous {
            if !is_anchor {
                return None;
            }
            self.discontinuous = false;

            let pts = frame.presentation_timestamp() - self.time_offset;
            if let Some(last_end) = self.last_anchor_end.take() {
                let gap = pts - last_end;
                self.time_offset += gap;
                log::debug!("Timeline resynced after {} gap (offset {})", gap, self.time_offset);
            }
        }

        let out = if self.time_offset.is_positive() {
            frame.retimed(self.time_offset)
        } else {
            frame.clone()
        };

        if is_anchor {
            self.record_anchor(&out);
        }
        Some(out)
    }

    /// `frame` is already on the output timeline.
    fn record_anchor(&mut self, frame: &Frame) {
        let pts = frame.presentation_timestamp();
        if let Some(previous) = self.last_anchor_pts {
            let interval = pts - previous;
            if interval.is_positive() {
                self.anchor_interval = interval;
            }
        }
        self.last_anchor_pts = Some(pts);

        let duration = frame.duration();
        let length = if duration.is_positive() {
            duration
        } else {
            self.anchor_interval
        };
        self.last_anchor_end = Some(pts + length);
    }
}
