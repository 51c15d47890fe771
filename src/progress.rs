//! Progress reporting.
//!
//! Every plan the orchestrator runs (a pair of prediction chains, one batch,
//! or a whole subprocess-encoded clip) knows up front how many frames it
//! will compress. A [`ProgressCallback`] registered on
//! [`CodecOptions`](crate::CodecOptions) sees one [`ProgressInfo`] per
//! compressed frame, thinned by
//! [`CodecOptions::with_report_interval`](crate::CodecOptions::with_report_interval),
//! and a closing report with no `current_frame` once the plan is done.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use gopcache::{
//!     Clip, CodecBackend, CodecOptions, Frame, ProgressCallback, ProgressInfo, RawCodec,
//!     VideoCompressor,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!(
//!             "[{:?}] {}/{} frames ({:.0}%)",
//!             info.operation,
//!             info.frames_done,
//!             info.frames_planned,
//!             info.percentage(),
//!         );
//!     }
//! }
//!
//! let options = CodecOptions::new().with_progress(Arc::new(PrintProgress));
//! let mut compressor =
//!     VideoCompressor::new(options, CodecBackend::Sequential(Box::new(RawCodec)))?;
//! compressor.start_clip(Clip::new(vec![Frame::zeros(3, 8, 8); 20])?)?;
//! compressor.request(9)?;
//! # Ok::<(), gopcache::CodecError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which driver produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Chained frame-by-frame compression.
    SequentialCompression,
    /// Shared-reference batch compression.
    ParallelCompression,
    /// Whole-clip encoding by an external encoder.
    ClipEncoding,
}

/// Progress of one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Driver doing the work.
    pub operation: OperationType,
    /// Frames compressed so far in this plan.
    pub frames_done: usize,
    /// Frames the plan compresses in total.
    pub frames_planned: usize,
    /// Wall-clock time since the plan started.
    pub elapsed: Duration,
    /// The frame just compressed. `None` on the closing report.
    pub current_frame: Option<usize>,
}

impl ProgressInfo {
    /// Share of the plan completed, 0 to 100.
    pub fn percentage(&self) -> f32 {
        if self.frames_planned == 0 {
            return 100.0;
        }
        self.frames_done as f32 * 100.0 / self.frames_planned as f32
    }

    /// Time left at the average per-frame rate so far.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let done = u32::try_from(self.frames_done).ok().filter(|&done| done > 0)?;
        let left = u32::try_from(self.frames_planned.saturating_sub(self.frames_done)).ok()?;
        Some(self.elapsed / done * left)
    }

    /// `true` for the report sent once the plan has finished.
    pub fn is_final(&self) -> bool {
        self.current_frame.is_none()
    }
}

/// Receives progress reports.
///
/// Callbacks run on the compressing thread and cannot stop a plan.
pub trait ProgressCallback: Send + Sync {
    /// Called after compressed frames and once at the end of each plan.
    fn on_progress(&self, info: &ProgressInfo);
}

/// The callback used when none is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Counts frames through one plan.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    frames_planned: usize,
    frames_done: usize,
    every: usize,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        frames_planned: usize,
        report_interval: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            frames_planned,
            frames_done: 0,
            every: usize::try_from(report_interval.max(1)).unwrap_or(usize::MAX),
            started: Instant::now(),
        }
    }

    /// Count `frame` as compressed. Reports on every `report_interval`-th
    /// frame of the plan.
    pub(crate) fn advance(&mut self, frame: usize) {
        self.frames_done += 1;
        if self.frames_done % self.every == 0 {
            self.emit(Some(frame));
        }
    }

    /// Send the closing report.
    pub(crate) fn finish(&mut self) {
        self.emit(None);
    }

    fn emit(&self, current_frame: Option<usize>) {
        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            frames_done: self.frames_done,
            frames_planned: self.frames_planned,
            elapsed: self.started.elapsed(),
            current_frame,
        });
    }
}
