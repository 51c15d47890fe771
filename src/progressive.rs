//! Sequential compression driver.
//!
//! Compresses a [`FrameRange`] one frame at a time in dependency order.
//! Each frame after the first is predicted from the frame compressed just
//! before it (its predecessor for forward ranges, its successor for backward
//! ranges), and the codec's recurrent state is threaded from frame to frame.
//!
//! The public entry point is
//! [`VideoCompressor::request`](crate::VideoCompressor::request); this
//! module contains only the driver.

use crate::cache::{FrameCache, FrameMetrics};
use crate::codec::SequentialCodec;
use crate::error::CodecError;
use crate::partition::{FrameRange, FrameType, PredictionDirection};
use crate::progress::ProgressTracker;

/// Compress every frame of `range` into `cache`.
///
/// The recurrent state is reset at the start of the range, since a range is
/// always a fresh prediction chain.
pub(crate) fn compress_range(
    cache: &mut FrameCache,
    codec: &mut dyn SequentialCodec,
    range: &FrameRange,
    tracker: &mut ProgressTracker,
) -> Result<(), CodecError> {
    let (_, height, width) = cache.shape();
    cache.set_hidden(codec.initial_state(width, height));

    for step in range.steps() {
        // Nothing precedes frame 0.
        let reference = if step.index == 0 { None } else { step.reference };
        let hidden = cache
            .take_hidden()
            .unwrap_or_else(|| codec.initial_state(width, height));

        let output = {
            let raw = cache.raw(step.index)?;
            let reference_frame = match reference {
                Some(reference) => Some(cache.reference(step.index, reference)?),
                None => None,
            };
            codec.compress(reference_frame, raw, hidden, step.predictive_context)?
        };

        let frame_type = match (reference, range.direction) {
            (None, _) => FrameType::Intra,
            (Some(_), PredictionDirection::Forward) => FrameType::ForwardPredicted,
            (Some(_), PredictionDirection::Backward) => FrameType::BackwardPredicted,
        };
        log::trace!(
            "Compressed frame {} ({frame_type}, ref {:?}, context {}): {:.4} bpp",
            step.index,
            reference,
            step.predictive_context,
            output.bits_actual,
        );

        let metrics = FrameMetrics::from_compression(&output, frame_type, reference);
        cache.set_hidden(output.hidden);
        cache.record(step.index, output.reconstructed, metrics)?;
        tracker.advance(step.index);
    }

    Ok(())
}
