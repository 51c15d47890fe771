//! Per-clip frame cache.
//!
//! A [`FrameCache`] holds one clip's frames and everything learned while
//! compressing them. Each slot starts as [`FrameSlot::Raw`] and moves to
//! [`FrameSlot::Reconstructed`] exactly once; from then on the reconstructed
//! frame is the reference for any frame predicted from it. Metrics are
//! written once per index and never change.
//!
//! Two watermarks track progress:
//!
//! - `max_seen`: the highest index requested so far.
//! - `max_proc`: the highest index whose compression has completed. Every
//!   index at or below it is reconstructed and has metrics.

use std::collections::BTreeMap;

use crate::codec::{FrameCompression, HiddenState};
use crate::error::CodecError;
use crate::frame::{Clip, Frame};
use crate::partition::FrameType;

/// One frame position in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSlot {
    /// The original, not yet compressed frame.
    Raw(Frame),
    /// The decoded frame after compression.
    Reconstructed(Frame),
}

impl FrameSlot {
    /// The frame in this slot, whichever state it is in.
    pub fn frame(&self) -> &Frame {
        match self {
            FrameSlot::Raw(frame) | FrameSlot::Reconstructed(frame) => frame,
        }
    }

    /// `true` once the slot holds a decoded frame.
    pub fn is_reconstructed(&self) -> bool {
        matches!(self, FrameSlot::Reconstructed(_))
    }
}

/// Bookkeeping recorded for one compressed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetrics {
    /// Differentiable rate estimate (bits per pixel).
    pub bits_estimated: f64,
    /// Entropy-coded or container rate (bits per pixel).
    pub bits_actual: f64,
    /// Reconstruction loss.
    pub distortion_loss: f64,
    /// Entropy-model auxiliary loss.
    pub auxiliary_loss: f64,
    /// Motion estimation loss.
    pub flow_loss: f64,
    /// Quality metric (PSNR in dB).
    pub quality: f64,
    /// How the frame was coded.
    pub frame_type: FrameType,
    /// The frame it was predicted from.
    pub reference: Option<usize>,
    /// Last frame of a shared-reference batch; the next batch references it.
    pub end_of_batch: bool,
}

impl FrameMetrics {
    /// Metrics from a single-frame codec result.
    pub fn from_compression(
        output: &FrameCompression,
        frame_type: FrameType,
        reference: Option<usize>,
    ) -> Self {
        Self {
            bits_estimated: output.bits_estimated,
            bits_actual: output.bits_actual,
            distortion_loss: output.distortion_loss,
            auxiliary_loss: output.auxiliary_loss,
            flow_loss: output.flow_loss,
            quality: output.quality,
            frame_type,
            reference,
            end_of_batch: false,
        }
    }
}

/// Mean metrics over a window of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    /// Number of frames averaged.
    pub frames: usize,
    /// Mean estimated rate.
    pub bits_estimated: f64,
    /// Mean actual rate.
    pub bits_actual: f64,
    /// Mean reconstruction loss.
    pub distortion_loss: f64,
    /// Mean auxiliary loss.
    pub auxiliary_loss: f64,
    /// Mean motion estimation loss.
    pub flow_loss: f64,
    /// Mean quality.
    pub quality: f64,
}

/// One decodable frame in a [`CacheSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    /// Frame index.
    pub index: usize,
    /// The reconstructed frame.
    pub reconstructed: Frame,
    /// Its metrics.
    pub metrics: FrameMetrics,
}

/// The cache contents a downstream consumer may use: every index up to
/// `max_proc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    /// Entries in index order.
    pub entries: Vec<SnapshotEntry>,
    /// Watermark of valid entries.
    pub max_proc: Option<usize>,
}

/// Mutable state for one clip.
#[derive(Debug, Clone)]
pub struct FrameCache {
    frames: Vec<FrameSlot>,
    max_seen: Option<usize>,
    max_proc: Option<usize>,
    metrics: BTreeMap<usize, FrameMetrics>,
    hidden: Option<HiddenState>,
}

impl FrameCache {
    /// A cache holding `clip`'s raw frames, with both watermarks unset.
    pub fn new(clip: Clip) -> Self {
        Self {
            frames: clip.into_frames().into_iter().map(FrameSlot::Raw).collect(),
            max_seen: None,
            max_proc: None,
            metrics: BTreeMap::new(),
            hidden: None,
        }
    }

    /// Number of frames (`clip_len`).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; clips are never empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// `(channels, height, width)` shared by every frame.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.frames[0].frame().shape()
    }

    /// Highest index requested so far.
    pub fn max_seen(&self) -> Option<usize> {
        self.max_seen
    }

    /// Highest index whose compression has completed.
    pub fn max_proc(&self) -> Option<usize> {
        self.max_proc
    }

    /// `true` if `index` is at or below `max_proc`.
    pub fn is_decodable(&self, index: usize) -> bool {
        self.max_proc.is_some_and(|max_proc| index <= max_proc)
    }

    /// The slot at `index`.
    pub fn slot(&self, index: usize) -> Result<&FrameSlot, CodecError> {
        self.frames.get(index).ok_or(CodecError::FrameOutOfRange {
            frame: index,
            clip_len: self.frames.len(),
        })
    }

    /// `true` if slot `index` holds a reconstructed frame.
    pub fn is_reconstructed(&self, index: usize) -> bool {
        self.frames
            .get(index)
            .is_some_and(FrameSlot::is_reconstructed)
    }

    /// Metrics recorded for `index`, if any.
    pub fn metrics(&self, index: usize) -> Option<&FrameMetrics> {
        self.metrics.get(&index)
    }

    /// The raw frame at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FrameAlreadyCompressed`] if the slot has
    /// already been reconstructed.
    pub fn raw(&self, index: usize) -> Result<&Frame, CodecError> {
        match self.slot(index)? {
            FrameSlot::Raw(frame) => Ok(frame),
            FrameSlot::Reconstructed(_) => Err(CodecError::FrameAlreadyCompressed { frame: index }),
        }
    }

    /// The reconstructed frame at `reference`, for use when compressing
    /// `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DependencyViolation`] if the reference slot is
    /// still raw.
    pub fn reference(&self, frame: usize, reference: usize) -> Result<&Frame, CodecError> {
        match self.frames.get(reference) {
            Some(FrameSlot::Reconstructed(decoded)) => Ok(decoded),
            _ => Err(CodecError::DependencyViolation {
                frame,
                reference,
                watermark: self.max_proc,
            }),
        }
    }

    /// Write the reconstruction and metrics for `index`.
    ///
    /// # Errors
    ///
    /// - [`CodecError::FrameAlreadyCompressed`] if the slot was already
    ///   written.
    /// - [`CodecError::FrameShapeMismatch`] if `reconstructed` does not
    ///   match the clip's shape.
    pub fn record(
        &mut self,
        index: usize,
        reconstructed: Frame,
        metrics: FrameMetrics,
    ) -> Result<(), CodecError> {
        reconstructed.expect_shape(self.shape())?;
        let clip_len = self.frames.len();
        let slot = self.frames.get_mut(index).ok_or(CodecError::FrameOutOfRange {
            frame: index,
            clip_len,
        })?;
        if slot.is_reconstructed() || self.metrics.contains_key(&index) {
            return Err(CodecError::FrameAlreadyCompressed { frame: index });
        }
        *slot = FrameSlot::Reconstructed(reconstructed);
        self.metrics.insert(index, metrics);
        Ok(())
    }

    /// Move the watermarks forward. Lower values are ignored.
    pub(crate) fn advance(&mut self, max_seen: usize, max_proc: usize) {
        self.max_seen = self.max_seen.max(Some(max_seen));
        self.max_proc = self.max_proc.max(Some(max_proc));
    }

    /// Mark every slot processed without recording a request.
    pub(crate) fn complete(&mut self) {
        self.max_proc = self.frames.len().checked_sub(1);
    }

    /// Take the recurrent state out of the cache.
    pub(crate) fn take_hidden(&mut self) -> Option<HiddenState> {
        self.hidden.take()
    }

    /// Store the recurrent state returned by the codec.
    pub(crate) fn set_hidden(&mut self, hidden: HiddenState) {
        self.hidden = Some(hidden);
    }

    /// The recurrent state currently held, if any.
    pub fn hidden(&self) -> Option<&HiddenState> {
        self.hidden.as_ref()
    }

    /// Every decodable frame with its metrics.
    pub fn snapshot(&self) -> CacheSnapshot {
        let entries = match self.max_proc {
            Some(max_proc) => self
                .metrics
                .range(..=max_proc)
                .map(|(&index, metrics)| SnapshotEntry {
                    index,
                    reconstructed: self.frames[index].frame().clone(),
                    metrics: metrics.clone(),
                })
                .collect(),
            None => Vec::new(),
        };
        CacheSnapshot {
            entries,
            max_proc: self.max_proc,
        }
    }

    /// Mean metrics over `indices`. Returns `None` if any index has no
    /// metrics yet or `indices` is empty.
    pub fn window_mean(&self, indices: &[usize]) -> Option<MetricSummary> {
        if indices.is_empty() {
            return None;
        }
        let mut summary = MetricSummary {
            frames: indices.len(),
            bits_estimated: 0.0,
            bits_actual: 0.0,
            distortion_loss: 0.0,
            auxiliary_loss: 0.0,
            flow_loss: 0.0,
            quality: 0.0,
        };
        for index in indices {
            let metrics = self.metrics.get(index)?;
            summary.bits_estimated += metrics.bits_estimated;
            summary.bits_actual += metrics.bits_actual;
            summary.distortion_loss += metrics.distortion_loss;
            summary.auxiliary_loss += metrics.auxiliary_loss;
            summary.flow_loss += metrics.flow_loss;
            summary.quality += metrics.quality;
        }
        let n = indices.len() as f64;
        summary.bits_estimated /= n;
        summary.bits_actual /= n;
        summary.distortion_loss /= n;
        summary.auxiliary_loss /= n;
        summary.flow_loss /= n;
        summary.quality /= n;
        Some(summary)
    }
}
