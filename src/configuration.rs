//! Compression configuration.
//!
//! [`CodecOptions`] is a builder that carries the GOP layout, batch size,
//! codec variant and progress callback into a
//! [`VideoCompressor`](crate::VideoCompressor) without widening every
//! constructor signature.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use gopcache::{CodecOptions, CodecVariant, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.frames_done);
//!     }
//! }
//!
//! let options = CodecOptions::new()
//!     .with_group_of_pictures(6, 6)
//!     .with_variant("RLVC".parse::<CodecVariant>()?)
//!     .with_progress(Arc::new(LogProgress));
//! assert_eq!(options.group_of_pictures().size(), 13);
//! # Ok::<(), gopcache::CodecError>(())
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::CodecError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::partition::GroupOfPictures;
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::validation::{Severity, ValidationReport};

/// GOP periods longer than this are reported as a warning.
const LONG_GOP_WARNING: usize = 300;

/// Which driver a codec needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecVariant {
    /// Chained prediction with recurrent state; uses the sequential driver.
    #[default]
    Sequential,
    /// Shared-reference batches; uses the parallel driver.
    Batch,
    /// Whole-clip external encoder; bypasses both drivers.
    Subprocess,
}

impl FromStr for CodecVariant {
    type Err = CodecError;

    /// Accepts driver names (`sequential`, `recurrent`, `batch`,
    /// `parallel`, `subprocess`, `standard`) and codec names (`RLVC`,
    /// `DVC`, `MRLVC-RPM-BPG`, `RAW`, `x264`, `x265`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" | "recurrent" | "rlvc" | "dvc" | "mrlvc-rpm-bpg" | "raw" => {
                Ok(CodecVariant::Sequential)
            }
            "batch" | "parallel" => Ok(CodecVariant::Batch),
            "subprocess" | "standard" | "x264" | "x265" => Ok(CodecVariant::Subprocess),
            _ => Err(CodecError::Configuration(format!("unrecognized codec variant: {value}"))),
        }
    }
}

impl Display for CodecVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CodecVariant::Sequential => write!(f, "sequential"),
            CodecVariant::Batch => write!(f, "batch"),
            CodecVariant::Subprocess => write!(f, "subprocess"),
        }
    }
}

/// Configuration for a [`VideoCompressor`](crate::VideoCompressor).
///
/// All fields have defaults: a 13-frame GOP (`fP = bP = 6`), batch size 4,
/// the sequential variant, no progress callback.
#[derive(Clone)]
pub struct CodecOptions {
    pub(crate) group_of_pictures: GroupOfPictures,
    pub(crate) batch_size: usize,
    pub(crate) variant: CodecVariant,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// How often to fire the progress callback (every N frames).
    pub(crate) report_interval: u64,
}

impl Debug for CodecOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CodecOptions")
            .field("forward", &self.group_of_pictures.forward())
            .field("backward", &self.group_of_pictures.backward())
            .field("batch_size", &self.batch_size)
            .field("variant", &self.variant)
            .field("report_interval", &self.report_interval)
            .finish()
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            group_of_pictures: GroupOfPictures::default(),
            batch_size: 4,
            variant: CodecVariant::Sequential,
            progress: Arc::new(NoOpProgress),
            report_interval: 1,
        }
    }

    /// Set the forward-P (`fP`) and backward-P (`bP`) run lengths.
    #[must_use]
    pub fn with_group_of_pictures(mut self, forward: usize, backward: usize) -> Self {
        self.group_of_pictures = GroupOfPictures::new(forward, backward);
        self
    }

    /// Set the GOP layout directly.
    #[must_use]
    pub fn with_layout(mut self, layout: GroupOfPictures) -> Self {
        self.group_of_pictures = layout;
        self
    }

    /// Set how many frames a batch codec compresses per call.
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Select the codec variant.
    #[must_use]
    pub fn with_variant(mut self, variant: CodecVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Fire the progress callback every `interval` frames. Clamped to a
    /// minimum of 1.
    #[must_use]
    pub fn with_report_interval(mut self, interval: u64) -> Self {
        self.report_interval = interval.max(1);
        self
    }

    /// The GOP layout.
    pub fn group_of_pictures(&self) -> GroupOfPictures {
        self.group_of_pictures
    }

    /// The batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The codec variant.
    pub fn variant(&self) -> CodecVariant {
        self.variant
    }

    /// Check the options for problems.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let Some(size) = self.group_of_pictures.checked_size() else {
            report.push(
                Severity::Error,
                format!(
                    "GOP of {} forward P + {} backward P frames overflows the period length",
                    self.group_of_pictures.forward(),
                    self.group_of_pictures.backward(),
                ),
            );
            return report;
        };

        if size > LONG_GOP_WARNING {
            report.push(
                Severity::Warning,
                format!("GOP of {size} frames is unusually long; error drift accumulates along P chains"),
            );
        }

        if self.variant == CodecVariant::Batch && self.batch_size >= size {
            report.push(
                Severity::Warning,
                format!(
                    "Batch size {} is not smaller than the GOP ({size}); batches are capped at GOP boundaries",
                    self.batch_size,
                ),
            );
        }

        if self.variant != CodecVariant::Sequential && self.group_of_pictures.backward() > 0 {
            report.push(
                Severity::Note,
                format!(
                    "Backward-P frames are only scheduled by the sequential driver; the {} variant uses a {size}-frame forward GOP",
                    self.variant,
                ),
            );
        }

        report.push(
            Severity::Note,
            format!(
                "GOP: I + {} forward P + {} backward P ({size} frames), {} driver",
                self.group_of_pictures.forward(),
                self.group_of_pictures.backward(),
                self.variant,
            ),
        );

        report
    }
}

/// Standard encoders available through ffmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StandardEncoder {
    /// H.264 via `libx264`.
    #[default]
    X264,
    /// H.265 via `libx265`.
    X265,
}

impl FromStr for StandardEncoder {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x264" | "h264" | "libx264" => Ok(StandardEncoder::X264),
            "x265" | "h265" | "hevc" | "libx265" => Ok(StandardEncoder::X265),
            _ => Err(CodecError::Configuration(format!("unsupported standard encoder: {value}"))),
        }
    }
}

impl Display for StandardEncoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StandardEncoder::X264 => write!(f, "x264"),
            StandardEncoder::X265 => write!(f, "x265"),
        }
    }
}

/// Settings for [`StandardCodec`](crate::StandardCodec).
#[derive(Debug, Clone)]
pub struct StandardCodecOptions {
    /// Encoder library.
    pub encoder: StandardEncoder,
    /// Input frame rate passed to ffmpeg (default: 25).
    pub fps: u32,
    /// Constant rate factor (default: 27).
    pub crf: u32,
    /// Keyframe interval (default: 10).
    pub keyframe_interval: u32,
    /// Encoder preset (default: `veryfast`).
    pub preset: String,
    /// ffmpeg's own log verbosity (default: error).
    pub log_level: FfmpegLogLevel,
    /// Explicit ffmpeg executable. `None` searches `PATH`.
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for StandardCodecOptions {
    fn default() -> Self {
        Self {
            encoder: StandardEncoder::X264,
            fps: 25,
            crf: 27,
            keyframe_interval: 10,
            preset: "veryfast".to_string(),
            log_level: FfmpegLogLevel::Error,
            ffmpeg_path: None,
        }
    }
}

impl StandardCodecOptions {
    /// Set the encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: StandardEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the constant rate factor.
    #[must_use]
    pub fn with_crf(mut self, crf: u32) -> Self {
        self.crf = crf;
        self
    }

    /// Set the keyframe interval. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_keyframe_interval(mut self, interval: u32) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    /// Set the input frame rate. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    /// Set ffmpeg's log level.
    #[must_use]
    pub fn with_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Use a specific ffmpeg executable.
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }
}
