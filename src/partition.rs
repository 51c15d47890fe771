//! Group of Pictures partitioning.
//!
//! This module answers one question: given a requested frame index and the
//! clip length, which frames must be compressed, in which order, and against
//! which references? Everything here is a pure function of indices, so it
//! can be tested without running a codec.
//!
//! A GOP period of `forward + backward + 1` frames is laid out as:
//!
//! ```text
//! pos:   0 | 1 .. forward | forward+1 .. forward+backward | (next I)
//! type:  I | forward P    | backward P                     | I
//! ```
//!
//! Forward P frames are predicted from their predecessor, backward P frames
//! from their successor, working down from the next I-frame (or the clip
//! end).
//!
//! # Example
//!
//! ```
//! use gopcache::{GroupOfPictures, PredictionDirection};
//!
//! let gop = GroupOfPictures::new(6, 6);
//! let plan = gop.plan(8, 100, false)?;
//!
//! assert_eq!(plan.ranges.len(), 2);
//! assert_eq!(plan.ranges[0].direction, PredictionDirection::Backward);
//! assert_eq!(plan.ranges[0].indices().collect::<Vec<_>>(), vec![13, 12, 11, 10, 9, 8]);
//! assert_eq!(plan.ranges[1].indices().collect::<Vec<_>>(), vec![14, 15, 16, 17, 18, 19]);
//! assert_eq!(plan.max_proc, 19);
//! # Ok::<(), gopcache::CodecError>(())
//! ```

use std::cmp::min;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::CodecError;

/// How a frame is coded within its GOP period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Intra coded, no reference.
    Intra,
    /// Predicted from the previous frame.
    ForwardPredicted,
    /// Predicted from the following frame.
    BackwardPredicted,
}

impl Display for FrameType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FrameType::Intra => write!(f, "I"),
            FrameType::ForwardPredicted => write!(f, "P>"),
            FrameType::BackwardPredicted => write!(f, "<P"),
        }
    }
}

/// Order in which a [`FrameRange`] is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictionDirection {
    /// Ascending indices; each frame references its predecessor.
    Forward,
    /// Descending indices; each frame references its successor.
    Backward,
}

/// GOP layout: `forward` forward-P frames and `backward` backward-P frames
/// after every I-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupOfPictures {
    forward: usize,
    backward: usize,
}

/// One frame of a range, resolved against its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStep {
    /// Frame to compress.
    pub index: usize,
    /// Frame to predict from. `None` means the intra path.
    pub reference: Option<usize>,
    /// `true` once the chain is at least two frames away from its I-frame,
    /// i.e. the codec's recurrent probability model has context.
    pub predictive_context: bool,
}

/// A run of frames forming one prediction chain.
///
/// `first` is compressed first and `last` last; for backward ranges
/// `first > last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    /// Compression order.
    pub direction: PredictionDirection,
    /// First index compressed.
    pub first: usize,
    /// Last index compressed.
    pub last: usize,
    /// Already-decoded frame that `first` is predicted from. `None` when
    /// `first` is intra coded.
    pub reference: Option<usize>,
    /// The I-frame the chain descends from.
    pub anchor: usize,
}

impl FrameRange {
    /// Indices in compression order.
    pub fn indices(&self) -> Box<dyn Iterator<Item = usize>> {
        match self.direction {
            PredictionDirection::Forward => Box::new(self.first..=self.last),
            PredictionDirection::Backward => Box::new((self.last..=self.first).rev()),
        }
    }

    /// Number of frames in the range.
    pub fn len(&self) -> usize {
        self.first.abs_diff(self.last) + 1
    }

    /// Ranges are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Highest index in the range.
    pub fn highest(&self) -> usize {
        self.first.max(self.last)
    }

    /// Lowest index in the range.
    pub fn lowest(&self) -> usize {
        self.first.min(self.last)
    }

    /// Resolve every frame to its reference and predictive flag.
    pub fn steps(&self) -> Vec<FrameStep> {
        let mut steps = Vec::with_capacity(self.len());
        let mut previous = self.reference;
        for index in self.indices() {
            let predictive_context = previous.is_some() && index.abs_diff(self.anchor) >= 2;
            steps.push(FrameStep {
                index,
                reference: previous,
                predictive_context,
            });
            previous = Some(index);
        }
        steps
    }
}

/// Output of [`GroupOfPictures::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPlan {
    /// Ranges in execution order.
    pub ranges: Vec<FrameRange>,
    /// The requested index.
    pub max_seen: usize,
    /// Highest index compressed once the plan has run.
    pub max_proc: usize,
}

impl CompressionPlan {
    /// Total number of frames the plan compresses.
    pub fn frame_count(&self) -> usize {
        self.ranges.iter().map(FrameRange::len).sum()
    }

    /// Every step of every range, in execution order.
    pub fn steps(&self) -> Vec<FrameStep> {
        self.ranges.iter().flat_map(FrameRange::steps).collect()
    }
}

/// Output of [`GroupOfPictures::plan_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPlan {
    /// A single intra-coded frame.
    Intra(usize),
    /// Contiguous frames `start..=end`, all predicted from `start - 1`.
    Range {
        /// First predicted frame.
        start: usize,
        /// Last predicted frame (marked end of batch).
        end: usize,
    },
}

impl BatchPlan {
    /// Shared reference index, `None` for the intra case.
    pub fn reference(&self) -> Option<usize> {
        match *self {
            BatchPlan::Intra(_) => None,
            BatchPlan::Range { start, .. } => Some(start - 1),
        }
    }

    /// Highest index compressed once the batch has run.
    pub fn max_proc(&self) -> usize {
        match *self {
            BatchPlan::Intra(index) => index,
            BatchPlan::Range { end, .. } => end,
        }
    }

    /// Number of frames compressed.
    pub fn len(&self) -> usize {
        match *self {
            BatchPlan::Intra(_) => 1,
            BatchPlan::Range { start, end } => end - start + 1,
        }
    }

    /// Batches are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl GroupOfPictures {
    /// Create a layout with `forward` forward-P and `backward` backward-P
    /// frames per period.
    pub fn new(forward: usize, backward: usize) -> Self {
        Self { forward, backward }
    }

    /// A forward-only layout of `size` frames (one I-frame then `size - 1`
    /// forward-P frames). A size of 1 makes every frame intra.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] for a size of zero.
    pub fn forward_only(size: usize) -> Result<Self, CodecError> {
        if size == 0 {
            return Err(CodecError::Configuration(
                "GOP size must be at least 1".to_string(),
            ));
        }
        Ok(Self::new(size - 1, 0))
    }

    /// Forward-P run length (`fP`).
    pub fn forward(&self) -> usize {
        self.forward
    }

    /// Backward-P run length (`bP`).
    pub fn backward(&self) -> usize {
        self.backward
    }

    /// Period length, `fP + bP + 1`, saturating at `usize::MAX`.
    pub fn size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }

    /// Period length, or `None` if `fP + bP + 1` overflows.
    pub fn checked_size(&self) -> Option<usize> {
        self.forward.checked_add(self.backward)?.checked_add(1)
    }

    /// Position of `index` within its period.
    pub fn position(&self, index: usize) -> usize {
        index % self.size()
    }

    /// Coding type of `index` in an uncapped clip.
    pub fn frame_type(&self, index: usize) -> FrameType {
        match self.position(index) {
            0 => FrameType::Intra,
            pos if pos <= self.forward => FrameType::ForwardPredicted,
            _ => FrameType::BackwardPredicted,
        }
    }

    /// Compute the ranges needed to make `requested` decodable (`index2GOP`).
    ///
    /// `start_new_clip` makes `requested` the chain's I-frame when it falls
    /// in a forward region, since nothing before it has been decoded.
    ///
    /// # Errors
    ///
    /// - [`CodecError::EmptyClip`] if `clip_len` is zero.
    /// - [`CodecError::FrameOutOfRange`] if `requested >= clip_len`.
    pub fn plan(
        &self,
        requested: usize,
        clip_len: usize,
        start_new_clip: bool,
    ) -> Result<CompressionPlan, CodecError> {
        check_bounds(requested, clip_len)?;
        let size = self.size();
        let last_frame = clip_len - 1;
        let pos = requested % size;
        let gop_start = requested - pos;

        let ranges = if pos <= self.forward {
            let first = if start_new_clip { requested } else { gop_start };
            let last = min(gop_start.saturating_add(self.forward), last_frame);
            vec![FrameRange {
                direction: PredictionDirection::Forward,
                first,
                last,
                reference: None,
                anchor: first,
            }]
        } else {
            let next_gop = gop_start.saturating_add(size);
            let mid = min(next_gop, last_frame);
            let mut ranges = vec![FrameRange {
                direction: PredictionDirection::Backward,
                first: mid,
                last: requested,
                reference: None,
                anchor: mid,
            }];
            let right = min(next_gop.saturating_add(self.forward), last_frame);
            if right > mid {
                ranges.push(FrameRange {
                    direction: PredictionDirection::Forward,
                    first: mid + 1,
                    last: right,
                    reference: Some(mid),
                    anchor: mid,
                });
            }
            ranges
        };

        let max_proc = ranges.iter().map(FrameRange::highest).max().unwrap_or(requested);
        log::debug!(
            "Planned {} range(s) for frame {} of {} (GOP {}, max_proc {})",
            ranges.len(),
            requested,
            clip_len,
            size,
            max_proc,
        );
        Ok(CompressionPlan {
            ranges,
            max_seen: requested,
            max_proc,
        })
    }

    /// Compute the next batch starting at `start` (`index2range`).
    ///
    /// A GOP boundary, or the first frame of a new clip, is a single intra
    /// frame. Otherwise the batch runs from `start` to the earliest of the
    /// clip end, the end of the current batch window (`batch_size` frames
    /// per window after the I-frame) and the last frame before the next GOP
    /// boundary.
    ///
    /// # Errors
    ///
    /// - [`CodecError::EmptyClip`] if `clip_len` is zero.
    /// - [`CodecError::FrameOutOfRange`] if `start >= clip_len`.
    pub fn plan_batch(
        &self,
        start: usize,
        clip_len: usize,
        batch_size: usize,
        start_new_clip: bool,
    ) -> Result<BatchPlan, CodecError> {
        check_bounds(start, clip_len)?;
        let size = self.size();
        let pos = start % size;
        if pos == 0 || start_new_clip {
            return Ok(BatchPlan::Intra(start));
        }

        let batch_size = batch_size.max(1);
        let gop_start = start - pos;
        let batch_end =
            gop_start.saturating_add(((pos - 1) / batch_size + 1).saturating_mul(batch_size));
        let gop_last = gop_start.saturating_add(size - 1);
        let end = min(clip_len - 1, min(batch_end, gop_last));
        Ok(BatchPlan::Range { start, end })
    }
}

impl Default for GroupOfPictures {
    fn default() -> Self {
        Self::new(6, 6)
    }
}

fn check_bounds(index: usize, clip_len: usize) -> Result<(), CodecError> {
    if clip_len == 0 {
        return Err(CodecError::EmptyClip);
    }
    if index >= clip_len {
        return Err(CodecError::FrameOutOfRange {
            frame: index,
            clip_len,
        });
    }
    Ok(())
}
