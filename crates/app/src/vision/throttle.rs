use std::time::{Duration, Instant};

/// Decides when the detector runs.
///
/// Analysis is due when no run has happened yet, when `interval` has elapsed
/// since the last run, or when `max_frames` frames have been published without
/// one.
#[derive(Clone, Debug)]
pub(crate) struct AnalysisThrottle {
    interval: Duration,
    max_frames: u32,
    frames_since_last: u32,
    last_run: Option<Instant>,
}

impl AnalysisThrottle {
    pub(crate) fn new(interval: Duration, max_frames: u32) -> Self {
        Self {
            interval,
            max_frames,
            frames_since_last: 0,
            last_run: None,
        }
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => {
                now.saturating_duration_since(last) >= self.interval
                    || self.frames_since_last >= self.max_frames
            }
        }
    }

    pub(crate) fn record_analysis(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.frames_since_last = 0;
    }

    pub(crate) fn record_skipped_frame(&mut self) {
        self.frames_since_last = self.frames_since_last.saturating_add(1);
    }

    pub(crate) fn frames_since_last(&self) -> u32 {
        self.frames_since_last
    }

    pub(crate) fn since_last(&self, now: Instant) -> Option<Duration> {
        self.last_run
            .map(|last| now.saturating_duration_since(last))
    }
}
