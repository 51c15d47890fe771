//! Parallel distortion metrics for whole-clip encodes.
//!
//! A subprocess-encoded clip arrives all at once, so the per-frame MSE and
//! PSNR are independent read-only computations. This module spreads them
//! across [`rayon`] worker threads.
//!
//! The public entry point is
//! [`VideoCompressor::start_clip`](crate::VideoCompressor::start_clip); this
//! module contains only the internal implementation.

use ::rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::error::CodecError;
use crate::frame::{Frame, psnr_from_mse};

/// `(mse, psnr)` for each `(raw, decoded)` pair, in clip order.
pub(crate) fn parallel_distortion(
    raw: &[Frame],
    decoded: &[Frame],
) -> Result<Vec<(f64, f64)>, CodecError> {
    raw.par_iter()
        .zip(decoded.par_iter())
        .map(|(original, reconstructed)| {
            let mse = original.mse(reconstructed)?;
            Ok((mse, psnr_from_mse(mse)))
        })
        .collect()
}
