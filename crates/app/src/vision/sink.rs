//! Latest-value store shared between the acquisition thread and viewers.
//!
//! There is exactly one [`SinkWriter`] and any number of [`FrameSink`]
//! readers. Every publish swaps the whole [`Snapshot`] under a short lock, so
//! a reader always sees the frame, counts and timestamps of a single publish.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use actix_web::web::Bytes;
use chrono::{DateTime, Local};

use crate::vision::data::{CategorySet, DetectionCounts, FrameKind};

/// Point-in-time view of the sink.
#[derive(Clone, Debug)]
pub(crate) struct Snapshot {
    /// Encoded JPEG, absent until the first publish.
    pub(crate) frame: Option<Bytes>,
    pub(crate) kind: Option<FrameKind>,
    pub(crate) counts: DetectionCounts,
    pub(crate) last_analysis: Option<DateTime<Local>>,
    /// Display form of the upstream address currently connected, if any.
    pub(crate) source: Option<String>,
    /// Number of publishes so far.
    pub(crate) sequence: u64,
}

impl Snapshot {
    /// Whole seconds since the last analysis, `None` before the first one.
    pub(crate) fn staleness(&self, now: DateTime<Local>) -> Option<i64> {
        self.last_analysis
            .map(|at| (now - at).num_seconds().max(0))
    }
}

/// Create an empty sink and its only writer.
pub(crate) fn frame_sink(categories: &CategorySet) -> (SinkWriter, FrameSink) {
    let shared = Arc::new(Mutex::new(Snapshot {
        frame: None,
        kind: None,
        counts: DetectionCounts::zeroed(categories),
        last_analysis: None,
        source: None,
        sequence: 0,
    }));
    (
        SinkWriter {
            shared: shared.clone(),
        },
        FrameSink { shared },
    )
}

/// Read side of the sink. Cheap to clone.
#[derive(Clone)]
pub(crate) struct FrameSink {
    shared: Arc<Mutex<Snapshot>>,
}

impl FrameSink {
    /// Consistent copy of the current state. Frame bytes are shared, not copied.
    pub(crate) fn snapshot(&self) -> Snapshot {
        lock(&self.shared).clone()
    }
}

/// Write side of the sink, owned by the acquisition loop.
pub(crate) struct SinkWriter {
    shared: Arc<Mutex<Snapshot>>,
}

impl SinkWriter {
    /// Replace the current frame in one step.
    ///
    /// `counts` and `analyzed_at` keep their previous values when `None`.
    pub(crate) fn publish(
        &mut self,
        frame: Bytes,
        kind: FrameKind,
        counts: Option<DetectionCounts>,
        analyzed_at: Option<DateTime<Local>>,
    ) {
        let mut guard = lock(&self.shared);
        guard.frame = Some(frame);
        guard.kind = Some(kind);
        if let Some(counts) = counts {
            guard.counts = counts;
        }
        if let Some(analyzed_at) = analyzed_at {
            guard.last_analysis = Some(analyzed_at);
        }
        guard.sequence = guard.sequence.wrapping_add(1);
    }

    pub(crate) fn set_source(&mut self, source: Option<String>) {
        lock(&self.shared).source = source;
    }
}

// Publishes never leave the snapshot half-written, so a poisoned lock still
// holds a usable value.
fn lock(shared: &Mutex<Snapshot>) -> MutexGuard<'_, Snapshot> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
