//! Training-loop support.
//!
//! A compression model trained alongside a downstream task goes through
//! phases: pretraining on intra frames only, then rate/flow training, then
//! training with the task loss. [`TrainingPhase::for_epoch`] gives the loss
//! weights and GOP size for an epoch, [`LossWeights::combine`] weights the
//! per-window loss terms for a codec family, and [`AverageMeter`] keeps
//! running means for reporting.
//!
//! # Example
//!
//! ```
//! use gopcache::{CodecFamily, LossTerms, TrainingPhase};
//!
//! let phase = TrainingPhase::for_epoch(7);
//! assert_eq!(phase.group_of_pictures, 10);
//! assert!(!phase.task_enabled);
//!
//! let terms = LossTerms { application: 0.0, pixel: 0.01, bits: 0.2, auxiliary: 3.0, flow: 0.5 };
//! let loss = phase.weights.combine(&terms, "RLVC".parse::<CodecFamily>()?);
//! assert!((loss - (0.1 + 0.2 + 3.0 + 0.5)).abs() < 1e-9);
//! # Ok::<(), gopcache::CodecError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::CodecError;

/// Loss weight for each term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    /// Rate (estimated bits) weight.
    pub bits: f64,
    /// Reconstruction weight.
    pub pixel: f64,
    /// Entropy-model auxiliary weight.
    pub auxiliary: f64,
    /// Motion estimation weight.
    pub flow: f64,
    /// Downstream task weight.
    pub application: f64,
}

/// Loss terms for one training step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LossTerms {
    /// Downstream task loss.
    pub application: f64,
    /// Reconstruction loss.
    pub pixel: f64,
    /// Estimated rate.
    pub bits: f64,
    /// Entropy-model auxiliary loss.
    pub auxiliary: f64,
    /// Motion estimation loss.
    pub flow: f64,
}

/// How a codec's training loss is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    /// Learned codecs trained with the downstream task (`MRLVC-RPM-BPG`,
    /// `RAW`).
    TaskAware,
    /// Learned codecs trained on compression terms only (`RLVC`, `DVC`).
    CompressionOnly,
    /// Standard encoders, which have no trainable weights.
    Standard,
}

impl FromStr for CodecFamily {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mrlvc-rpm-bpg" | "raw" => Ok(CodecFamily::TaskAware),
            "rlvc" | "dvc" => Ok(CodecFamily::CompressionOnly),
            "x264" | "x265" => Ok(CodecFamily::Standard),
            _ => Err(CodecError::Configuration(format!(
                "no training loss defined for codec {value}"
            ))),
        }
    }
}

impl Display for CodecFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CodecFamily::TaskAware => write!(f, "task-aware"),
            CodecFamily::CompressionOnly => write!(f, "compression-only"),
            CodecFamily::Standard => write!(f, "standard"),
        }
    }
}

impl LossWeights {
    /// Every weight set to `value`.
    pub fn uniform(value: f64) -> Self {
        Self {
            bits: value,
            pixel: value,
            auxiliary: value,
            flow: value,
            application: value,
        }
    }

    /// Weighted training loss for `family`.
    ///
    /// Task-aware codecs weight all five terms. Compression-only codecs drop
    /// the task term. Standard codecs sum the terms unweighted.
    pub fn combine(&self, terms: &LossTerms, family: CodecFamily) -> f64 {
        let compression = self.pixel * terms.pixel
            + self.bits * terms.bits
            + self.auxiliary * terms.auxiliary
            + self.flow * terms.flow;
        match family {
            CodecFamily::TaskAware => self.application * terms.application + compression,
            CodecFamily::CompressionOnly => compression,
            CodecFamily::Standard => {
                terms.application + terms.pixel + terms.bits + terms.auxiliary + terms.flow
            }
        }
    }
}

/// Settings for one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingPhase {
    /// Loss weights.
    pub weights: LossWeights,
    /// GOP period. 1 during intra-only pretraining.
    pub group_of_pictures: usize,
    /// Whether the downstream task loss is computed.
    pub task_enabled: bool,
}

impl TrainingPhase {
    /// The phase schedule.
    ///
    /// | epoch | bits | pixel | aux | flow | task | GOP |
    /// |---|---|---|---|---|---|---|
    /// | `< -1` | 1 | 1 | 1 | 1 | 1 | 1 |
    /// | `-1` | 1 | 1 | 1 | 1 | 1 | 10 |
    /// | `0 ..= 4` | 1 | 0 | 1 | 0 | 0 | 10 |
    /// | `>= 5` | 1 | 10 | 1 | 1 | 0 | 10 |
    pub fn for_epoch(epoch: i64) -> Self {
        let weights = if epoch <= -1 {
            LossWeights::uniform(1.0)
        } else if epoch <= 4 {
            LossWeights {
                bits: 1.0,
                pixel: 0.0,
                auxiliary: 1.0,
                flow: 0.0,
                application: 0.0,
            }
        } else {
            LossWeights {
                bits: 1.0,
                pixel: 10.0,
                auxiliary: 1.0,
                flow: 1.0,
                application: 0.0,
            }
        };
        let phase = Self {
            weights,
            group_of_pictures: if epoch >= -1 { 10 } else { 1 },
            task_enabled: weights.application > 0.0,
        };
        log::debug!("Training phase for epoch {epoch}: {phase:?}");
        phase
    }
}

/// Running mean of a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AverageMeter {
    /// Last value added.
    pub val: f64,
    /// Mean of all values, weighted by count.
    pub avg: f64,
    /// Weighted sum.
    pub sum: f64,
    /// Total weight.
    pub count: u64,
}

impl AverageMeter {
    /// An empty meter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add `value`, counted `n` times.
    pub fn update(&mut self, value: f64, n: u64) {
        self.val = value;
        self.sum += value * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}
