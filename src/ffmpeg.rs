//! ffmpeg executable discovery and log levels.
//!
//! The standard codecs run the `ffmpeg` command-line tool as a subprocess.
//! ffmpeg has its own logging, separate from the Rust [`log`] facade; its
//! verbosity is passed on the command line via [`FfmpegLogLevel`].
//!
//! # Example
//!
//! ```no_run
//! use gopcache::{FfmpegLogLevel, StandardCodecOptions};
//!
//! let options = StandardCodecOptions::default().with_log_level(FfmpegLogLevel::Quiet);
//! if gopcache::ffmpeg::ffmpeg_available(None) {
//!     println!("ffmpeg found");
//! }
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use crate::error::CodecError;

/// ffmpeg's internal log verbosity, passed as `-loglevel`.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log conditions that abort the process.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings (ffmpeg's default).
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    /// The value for ffmpeg's `-loglevel` flag.
    pub fn as_arg(self) -> &'static str {
        match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Panic => "panic",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Verbose => "verbose",
            FfmpegLogLevel::Debug => "debug",
            FfmpegLogLevel::Trace => "trace",
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_arg())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            _ => Err(CodecError::Configuration(format!(
                "unsupported ffmpeg log level: {value}"
            ))),
        }
    }
}

/// The ffmpeg executable to run: `explicit` if given, else `ffmpeg` from
/// `PATH`.
pub fn ffmpeg_executable(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("ffmpeg"))
}

/// Returns `true` if the ffmpeg executable can be run.
pub fn ffmpeg_available(explicit: Option<&Path>) -> bool {
    Command::new(ffmpeg_executable(explicit))
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}
