//! # gopcache
//!
//! On-demand GOP scheduling and frame caching for learned video compression.
//!
//! Predictive video codecs compress most frames relative to an already
//! decoded reference, so asking for frame `i` of a clip usually means
//! compressing other frames first. `gopcache` works out which ones, runs them
//! through a codec in dependency order, and keeps every reconstructed frame
//! and its rate/distortion bookkeeping in a per-clip cache so that no frame
//! is ever compressed twice.
//!
//! ## Quick Start
//!
//! ### Plan a request
//!
//! ```
//! use gopcache::GroupOfPictures;
//!
//! // I-frame, 6 forward-P frames, 6 backward-P frames per period.
//! let gop = GroupOfPictures::new(6, 6);
//! let plan = gop.plan(4, 100, false)?;
//! assert_eq!(plan.ranges[0].indices().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5, 6]);
//! assert_eq!(plan.max_proc, 6);
//! # Ok::<(), gopcache::CodecError>(())
//! ```
//!
//! ### Serve frames from a codec
//!
//! ```
//! use gopcache::{Clip, CodecBackend, CodecOptions, Frame, RawCodec, VideoCompressor};
//!
//! let mut compressor = VideoCompressor::new(
//!     CodecOptions::new(),
//!     CodecBackend::Sequential(Box::new(RawCodec)),
//! )?;
//! compressor.start_clip(Clip::new(vec![Frame::filled(3, 32, 32, 0.25); 40])?)?;
//!
//! let metrics = compressor.request(8)?;
//! println!("frame 8: {} ({:.3} bpp)", metrics.frame_type, metrics.bits_actual);
//! # Ok::<(), gopcache::CodecError>(())
//! ```
//!
//! ## Features
//!
//! - **GOP partitioning**: forward and backward prediction chains per period
//!   for chained codecs, shared-reference batches for batch codecs
//! - **Memoized compression**: requests at or below the processed watermark
//!   never touch the codec
//! - **Three codec capabilities**: sequential (recurrent state threaded
//!   between frames), batch (one call per shared-reference batch) and whole
//!   clip (x264 / x265 through the ffmpeg executable)
//! - **Typed cache**: write-once frame slots and metrics, snapshots for
//!   downstream training
//! - **Training helpers**: per-epoch loss weights, loss combination and
//!   running meters
//! - **Progress callbacks** and **validation reports**
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | Per-frame distortion of whole-clip encodes is computed across rayon threads |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! The standard codecs need an `ffmpeg` executable with `libx264` /
//! `libx265`, found on `PATH` unless configured explicitly. Nothing else
//! depends on it.

pub mod cache;
pub mod codec;
pub mod compressor;
pub mod configuration;
pub mod error;
pub mod ffmpeg;
pub mod frame;
mod parallel;
pub mod partition;
mod progressive;
pub mod progress;
#[cfg(feature = "rayon")]
mod rayon;
pub mod standard;
pub mod training;
pub mod validation;

pub use cache::{CacheSnapshot, FrameCache, FrameMetrics, FrameSlot, MetricSummary, SnapshotEntry};
pub use codec::{
    BatchCodec, BatchCompression, ClipCodec, ClipCompression, CodecBackend, FrameCompression,
    HiddenState, RawCodec, SequentialCodec,
};
pub use compressor::{ClipState, VideoCompressor};
pub use configuration::{CodecOptions, CodecVariant, StandardCodecOptions, StandardEncoder};
pub use error::CodecError;
pub use ffmpeg::FfmpegLogLevel;
pub use frame::{Clip, Frame};
pub use partition::{
    BatchPlan, CompressionPlan, FrameRange, FrameStep, FrameType, GroupOfPictures,
    PredictionDirection,
};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use standard::{StandardCodec, uniform_rate};
pub use training::{AverageMeter, CodecFamily, LossTerms, LossWeights, TrainingPhase};
pub use validation::{Severity, ValidationReport, validate_clip};
