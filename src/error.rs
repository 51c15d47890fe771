//! Error types for the `gopcache` crate.
//!
//! This module defines [`CodecError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry the frame indices, counts,
//! and command lines needed to diagnose a failed clip without extra logging
//! at the call site.

use std::io::Error as IoError;

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `gopcache` operations.
///
/// Every variant except the configuration ones aborts the clip that was
/// being processed. After an abort the cache must be discarded and a new
/// clip started with [`VideoCompressor::start_clip`](crate::VideoCompressor::start_clip).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The configuration is invalid (unknown codec variant, a backend that
    /// does not match the configured variant, or a failed validation).
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A driver tried to use a frame as a reference before it was
    /// reconstructed. This is a scheduling defect, not a recoverable state.
    #[error(
        "Dependency violation: frame {frame} references frame {reference}, which is not reconstructed (watermark {watermark:?})"
    )]
    DependencyViolation {
        /// The frame being compressed.
        frame: usize,
        /// The reference frame it needed.
        reference: usize,
        /// The cache's `max_proc` at the time of the access.
        watermark: Option<usize>,
    },

    /// A slot that was already reconstructed was written a second time.
    #[error("Frame {frame} has already been compressed")]
    FrameAlreadyCompressed {
        /// The frame index.
        frame: usize,
    },

    /// The subprocess codec returned a different number of frames than it
    /// was given.
    #[error("Clip length mismatch: encoded {expected} frames but decoded {actual}")]
    ClipLengthMismatch {
        /// Number of frames sent to the encoder.
        expected: usize,
        /// Number of frames read back.
        actual: usize,
    },

    /// A batch codec returned per-frame outputs of the wrong length.
    #[error("Batch length mismatch: expected {expected} outputs for {field}, got {actual}")]
    BatchLengthMismatch {
        /// Which output vector was malformed.
        field: &'static str,
        /// Number of predicted frames in the batch.
        expected: usize,
        /// Number of entries returned.
        actual: usize,
    },

    /// An external encoder or decoder failed.
    #[error("External process failed ({command}): {reason}")]
    ExternalProcess {
        /// The program and arguments that were run.
        command: String,
        /// Exit status or spawn/output failure.
        reason: String,
    },

    /// The requested frame index is past the end of the clip.
    #[error("Frame {frame} is out of range (clip has {clip_len} frames)")]
    FrameOutOfRange {
        /// The index that was requested.
        frame: usize,
        /// The number of frames in the clip.
        clip_len: usize,
    },

    /// Two frames that must share a shape do not.
    #[error("Frame shape mismatch: expected {expected:?}, got {actual:?}")]
    FrameShapeMismatch {
        /// `(channels, height, width)` expected.
        expected: (usize, usize, usize),
        /// `(channels, height, width)` found.
        actual: (usize, usize, usize),
    },

    /// A clip with no frames was supplied.
    #[error("Clip contains no frames")]
    EmptyClip,

    /// A frame was requested before any clip was started.
    #[error("No clip is active; call start_clip first")]
    NoActiveClip,

    /// The active clip was aborted by an earlier error.
    #[error("Clip processing was aborted; start a new clip")]
    ClipAborted,

    /// An I/O error occurred while talking to a subprocess or the file system.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while loading or converting frames.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}
