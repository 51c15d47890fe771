//! Frame codec capabilities.
//!
//! The scheduling core never looks inside a codec. It talks to one of three
//! capability traits:
//!
//! - [`SequentialCodec`]: one frame per call, predicted from one reference,
//!   with recurrent state threaded between calls (optical flow plus
//!   recurrent entropy models).
//! - [`BatchCodec`]: many frames per call, all predicted from one shared
//!   reference (attention-style entropy models).
//! - [`ClipCodec`]: a whole clip in one call (standard encoders run as a
//!   subprocess).
//!
//! [`CodecBackend`] wraps exactly one of them, and its variant must match the
//! configured [`CodecVariant`].

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::configuration::CodecVariant;
use crate::error::CodecError;
use crate::frame::Frame;

/// Opaque recurrent state of a sequential codec.
///
/// The cache owns it between calls and moves it into the codec, which
/// returns the updated state by value. A codec therefore cannot keep an
/// alias to state that a later clip will see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiddenState {
    /// Flat state buffers, one per recurrent component.
    pub buffers: Vec<Vec<f32>>,
}

impl HiddenState {
    /// A state of zero-filled buffers with the given lengths.
    pub fn zeroed(lengths: &[usize]) -> Self {
        Self {
            buffers: lengths.iter().map(|&len| vec![0.0; len]).collect(),
        }
    }

    /// `true` when every buffer is all zeros.
    pub fn is_zero(&self) -> bool {
        self.buffers.iter().flatten().all(|value| *value == 0.0)
    }
}

/// Result of compressing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCompression {
    /// Decoded frame; becomes the reference for later frames.
    pub reconstructed: Frame,
    /// Recurrent state after this frame.
    pub hidden: HiddenState,
    /// Differentiable rate estimate (bits per pixel).
    pub bits_estimated: f64,
    /// Reconstruction loss.
    pub distortion_loss: f64,
    /// Entropy-model auxiliary loss.
    pub auxiliary_loss: f64,
    /// Motion estimation loss (zero for intra frames).
    pub flow_loss: f64,
    /// Entropy-coded rate (bits per pixel).
    pub bits_actual: f64,
    /// Quality metric (PSNR in dB).
    pub quality: f64,
}

/// Result of compressing a batch that shares one reference.
///
/// Every vector has one entry per predicted frame; `auxiliary_loss` is
/// reported once for the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCompression {
    /// Decoded frames in batch order.
    pub reconstructed: Vec<Frame>,
    /// Per-frame rate estimates.
    pub bits_estimated: Vec<f64>,
    /// Per-frame reconstruction losses.
    pub distortion_loss: Vec<f64>,
    /// Aggregate auxiliary loss for the batch.
    pub auxiliary_loss: f64,
    /// Per-frame entropy-coded rates.
    pub bits_actual: Vec<f64>,
    /// Per-frame quality metrics.
    pub quality: Vec<f64>,
}

/// Result of encoding and decoding a whole clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipCompression {
    /// Decoded frames in clip order.
    pub frames: Vec<Frame>,
    /// Size of the encoded container in bits.
    pub total_bits: u64,
}

/// A codec compressing one frame at a time against one reference.
pub trait SequentialCodec {
    /// Fresh recurrent state for frames of the given size.
    fn initial_state(&self, width: usize, height: usize) -> HiddenState;

    /// Compress `raw`.
    ///
    /// `reference` is `None` for intra frames. `predictive_context` is
    /// `false` for the first P-frame after an I-frame (no probability-model
    /// context yet) and `true` afterwards.
    fn compress(
        &mut self,
        reference: Option<&Frame>,
        raw: &Frame,
        hidden: HiddenState,
        predictive_context: bool,
    ) -> Result<FrameCompression, CodecError>;
}

/// A codec compressing several frames against one shared reference in a
/// single call.
pub trait BatchCodec {
    /// Compress a single intra frame.
    fn compress_intra(&mut self, raw: &Frame) -> Result<FrameCompression, CodecError>;

    /// Compress `frames[1..]`, all predicted from `frames[0]`.
    fn compress_batch(&mut self, frames: &[Frame]) -> Result<BatchCompression, CodecError>;
}

/// A codec that encodes a whole clip at once.
pub trait ClipCodec {
    /// Encode and decode `frames`, returning the decoded frames and the
    /// container size in bits.
    fn compress_clip(
        &mut self,
        frames: &[Frame],
        width: usize,
        height: usize,
    ) -> Result<ClipCompression, CodecError>;
}

/// A codec implementation tagged with its capability.
pub enum CodecBackend {
    /// Chained, recurrent compression.
    Sequential(Box<dyn SequentialCodec + Send>),
    /// Shared-reference batch compression.
    Batch(Box<dyn BatchCodec + Send>),
    /// Whole-clip subprocess compression.
    Subprocess(Box<dyn ClipCodec + Send>),
}

impl CodecBackend {
    /// The variant this backend implements.
    pub fn variant(&self) -> CodecVariant {
        match self {
            CodecBackend::Sequential(_) => CodecVariant::Sequential,
            CodecBackend::Batch(_) => CodecVariant::Batch,
            CodecBackend::Subprocess(_) => CodecVariant::Subprocess,
        }
    }
}

impl Debug for CodecBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("CodecBackend").field(&self.variant()).finish()
    }
}

/// Pass-through codec: every frame is "reconstructed" as itself with zero
/// rate and zero losses.
///
/// Useful as a baseline and for exercising the scheduler without a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RawCodec {
    fn passthrough(raw: &Frame, hidden: HiddenState) -> FrameCompression {
        FrameCompression {
            reconstructed: raw.clone(),
            hidden,
            bits_estimated: 0.0,
            distortion_loss: 0.0,
            auxiliary_loss: 0.0,
            flow_loss: 0.0,
            bits_actual: 0.0,
            quality: f64::INFINITY,
        }
    }
}

impl SequentialCodec for RawCodec {
    fn initial_state(&self, _width: usize, _height: usize) -> HiddenState {
        HiddenState::default()
    }

    fn compress(
        &mut self,
        _reference: Option<&Frame>,
        raw: &Frame,
        hidden: HiddenState,
        _predictive_context: bool,
    ) -> Result<FrameCompression, CodecError> {
        Ok(Self::passthrough(raw, hidden))
    }
}

impl BatchCodec for RawCodec {
    fn compress_intra(&mut self, raw: &Frame) -> Result<FrameCompression, CodecError> {
        Ok(Self::passthrough(raw, HiddenState::default()))
    }

    fn compress_batch(&mut self, frames: &[Frame]) -> Result<BatchCompression, CodecError> {
        let predicted = frames.get(1..).unwrap_or_default();
        let n = predicted.len();
        Ok(BatchCompression {
            reconstructed: predicted.to_vec(),
            bits_estimated: vec![0.0; n],
            distortion_loss: vec![0.0; n],
            auxiliary_loss: 0.0,
            bits_actual: vec![0.0; n],
            quality: vec![f64::INFINITY; n],
        })
    }
}
