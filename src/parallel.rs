//! Parallel (batched) compression driver.
//!
//! Compresses a [`BatchPlan`] in a single codec call: every frame in the
//! batch is predicted from the same reference, the last frame of the
//! previous batch (or the GOP's I-frame). "Parallel" means one vectorized
//! codec invocation, not concurrent scheduling.
//!
//! The public entry point is
//! [`VideoCompressor::request`](crate::VideoCompressor::request); this
//! module contains only the driver.

use crate::cache::{FrameCache, FrameMetrics};
use crate::codec::{BatchCodec, BatchCompression};
use crate::error::CodecError;
use crate::frame::Frame;
use crate::partition::{BatchPlan, FrameType};
use crate::progress::ProgressTracker;

/// Compress one batch into `cache`.
///
/// The batch's auxiliary loss is reported once by the codec and split
/// evenly across its frames. The last frame is marked `end_of_batch`.
pub(crate) fn compress_batch(
    cache: &mut FrameCache,
    codec: &mut dyn BatchCodec,
    plan: BatchPlan,
    tracker: &mut ProgressTracker,
) -> Result<(), CodecError> {
    match plan {
        BatchPlan::Intra(index) => {
            let output = codec.compress_intra(cache.raw(index)?)?;
            let mut metrics = FrameMetrics::from_compression(&output, FrameType::Intra, None);
            metrics.end_of_batch = true;
            log::trace!("Compressed intra frame {index}: {:.4} bpp", output.bits_actual);
            cache.record(index, output.reconstructed, metrics)?;
            tracker.advance(index);
        }
        BatchPlan::Range { start, end } => {
            let reference = start - 1;
            let batch = gather(cache, reference, start, end)?;
            let output = codec.compress_batch(&batch)?;
            let n = end - start + 1;
            check_lengths(&output, n)?;

            let shared_aux = output.auxiliary_loss / n as f64;
            log::trace!(
                "Compressed batch {start}..={end} against frame {reference} (aux {:.4})",
                output.auxiliary_loss,
            );

            let BatchCompression {
                reconstructed,
                bits_estimated,
                distortion_loss,
                bits_actual,
                quality,
                ..
            } = output;
            for (offset, frame) in reconstructed.into_iter().enumerate() {
                let index = start + offset;
                let metrics = FrameMetrics {
                    bits_estimated: bits_estimated[offset],
                    bits_actual: bits_actual[offset],
                    distortion_loss: distortion_loss[offset],
                    auxiliary_loss: shared_aux,
                    flow_loss: 0.0,
                    quality: quality[offset],
                    frame_type: FrameType::ForwardPredicted,
                    reference: Some(reference),
                    end_of_batch: index == end,
                };
                cache.record(index, frame, metrics)?;
                tracker.advance(index);
            }
        }
    }
    Ok(())
}

/// Collect `[reference, raw start, ..., raw end]`.
fn gather(
    cache: &FrameCache,
    reference: usize,
    start: usize,
    end: usize,
) -> Result<Vec<Frame>, CodecError> {
    let mut batch = Vec::with_capacity(end - start + 2);
    batch.push(cache.reference(start, reference)?.clone());
    for index in start..=end {
        batch.push(cache.raw(index)?.clone());
    }
    Ok(batch)
}

fn check_lengths(output: &BatchCompression, expected: usize) -> Result<(), CodecError> {
    let fields = [
        ("reconstructed", output.reconstructed.len()),
        ("bits_estimated", output.bits_estimated.len()),
        ("distortion_loss", output.distortion_loss.len()),
        ("bits_actual", output.bits_actual.len()),
        ("quality", output.quality.len()),
    ];
    for (field, actual) in fields {
        if actual != expected {
            return Err(CodecError::BatchLengthMismatch {
                field,
                expected,
                actual,
            });
        }
    }
    Ok(())
}
