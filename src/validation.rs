//! Option and clip validation.
//!
//! [`CodecOptions::validate`](crate::CodecOptions::validate) and
//! [`validate_clip`] return a [`ValidationReport`] describing problems found
//! before any codec runs.
//!
//! # Example
//!
//! ```
//! use gopcache::{CodecOptions, Frame, validate_clip};
//!
//! let report = CodecOptions::new().validate();
//! assert!(report.is_valid());
//!
//! let report = validate_clip(&[Frame::zeros(3, 8, 8), Frame::zeros(3, 4, 4)]);
//! assert!(!report.is_valid());
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::CodecError;
use crate::frame::Frame;

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Describes the input; not a problem.
    Note,
    /// Compression can run but may misbehave or be slow.
    Warning,
    /// Compression cannot run.
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Findings of one validation pass, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    issues: Vec<(Severity, String)>,
}

impl ValidationReport {
    pub(crate) fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.issues.push((severity, message.into()));
    }

    /// `true` when nothing of [`Severity::Error`] was found.
    pub fn is_valid(&self) -> bool {
        self.messages(Severity::Error).next().is_none()
    }

    /// Messages of exactly `severity`.
    pub fn messages(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(move |(found, _)| *found == severity)
            .map(|(_, message)| message.as_str())
    }

    /// Warning messages.
    pub fn warnings(&self) -> Vec<&str> {
        self.messages(Severity::Warning).collect()
    }

    /// Error messages.
    pub fn errors(&self) -> Vec<&str> {
        self.messages(Severity::Error).collect()
    }

    /// Every finding with its severity.
    pub fn issues(&self) -> &[(Severity, String)] {
        &self.issues
    }

    /// Log warnings, then fail with [`CodecError::Configuration`] if any
    /// error was found.
    pub(crate) fn check(&self) -> Result<(), CodecError> {
        for warning in self.messages(Severity::Warning) {
            log::warn!("{warning}");
        }
        if self.is_valid() {
            return Ok(());
        }
        Err(CodecError::Configuration(self.errors().join("; ")))
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.issues.is_empty() {
            return writeln!(f, "nothing to report");
        }
        for (severity, message) in &self.issues {
            writeln!(f, "{severity}: {message}")?;
        }
        Ok(())
    }
}

/// Check a list of raw frames before it becomes a clip.
pub fn validate_clip(frames: &[Frame]) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(first) = frames.first() else {
        report.push(Severity::Error, "Clip contains no frames");
        return report;
    };

    let (channels, height, width) = first.shape();
    if channels == 0 || height == 0 || width == 0 {
        report.push(
            Severity::Error,
            format!("Invalid frame shape: {channels}×{height}×{width}"),
        );
    }

    let mismatched: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(_, frame)| frame.shape() != first.shape())
        .map(|(index, _)| index)
        .collect();
    if !mismatched.is_empty() {
        report.push(
            Severity::Error,
            format!(
                "{} frame(s) differ in shape from frame 0 (first at index {})",
                mismatched.len(),
                mismatched[0],
            ),
        );
    }

    if channels != 3 {
        report.push(
            Severity::Warning,
            format!("Frames have {channels} channel(s); standard encoders require 3"),
        );
    }

    if height % 2 != 0 || width % 2 != 0 {
        report.push(
            Severity::Warning,
            format!("Odd frame size {width}×{height} cannot be encoded as yuv420p"),
        );
    }

    report.push(
        Severity::Note,
        format!(
            "Clip: {} frame(s) of {channels}×{height}×{width}",
            frames.len(),
        ),
    );

    report
}
