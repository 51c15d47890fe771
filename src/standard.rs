//! Standard codecs (x264 / x265) run through the ffmpeg executable.
//!
//! [`StandardCodec`] pipes a clip's raw frames into an ffmpeg encoder as
//! `rgb24` rawvideo, measures the resulting container, and decodes it back
//! with a second ffmpeg process. The container size is the clip's total
//! rate; the caller spreads it uniformly over the frames.
//!
//! Neither process is retried on failure: the encode is deterministic.
//!
//! # Example
//!
//! ```no_run
//! use gopcache::{
//!     Clip, CodecBackend, CodecOptions, CodecVariant, Frame, StandardCodec,
//!     StandardCodecOptions, StandardEncoder, VideoCompressor,
//! };
//!
//! let codec =
//!     StandardCodec::new(StandardCodecOptions::default().with_encoder(StandardEncoder::X265));
//! let options = CodecOptions::new().with_variant(CodecVariant::Subprocess);
//! let mut compressor = VideoCompressor::new(options, CodecBackend::Subprocess(Box::new(codec)))?;
//! compressor.start_clip(Clip::new(vec![Frame::filled(3, 64, 64, 0.5); 10])?)?;
//! println!("{:?}", compressor.metrics(3));
//! # Ok::<(), gopcache::CodecError>(())
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Output, Stdio};
use std::thread;

use crate::codec::{ClipCodec, ClipCompression};
use crate::configuration::{StandardCodecOptions, StandardEncoder};
use crate::error::CodecError;
use crate::ffmpeg::ffmpeg_executable;
use crate::frame::Frame;

const CONTAINER_NAME: &str = "output.mp4";

/// x264 / x265 through ffmpeg subprocesses.
#[derive(Debug, Clone, Default)]
pub struct StandardCodec {
    options: StandardCodecOptions,
}

impl StandardCodec {
    /// Create a codec with the given settings.
    pub fn new(options: StandardCodecOptions) -> Self {
        Self { options }
    }

    /// The codec's settings.
    pub fn options(&self) -> &StandardCodecOptions {
        &self.options
    }

    /// Arguments for the encoding process, reading rawvideo from stdin and
    /// writing `output`.
    pub fn encode_arguments(&self, width: usize, height: usize, output: &Path) -> Vec<String> {
        let options = &self.options;
        let mut arguments: Vec<String> = [
            "-y",
            "-loglevel",
            options.log_level.as_arg(),
            "-s",
            &format!("{width}x{height}"),
            "-pixel_format",
            "rgb24",
            "-f",
            "rawvideo",
            "-r",
            &options.fps.to_string(),
            "-i",
            "pipe:",
        ]
        .iter()
        .map(|argument| argument.to_string())
        .collect();

        match options.encoder {
            StandardEncoder::X264 => arguments.extend(
                [
                    "-vcodec",
                    "libx264",
                    "-pix_fmt",
                    "yuv420p",
                    "-preset",
                    &options.preset,
                    "-tune",
                    "zerolatency",
                    "-crf",
                    &options.crf.to_string(),
                    "-g",
                    &options.keyframe_interval.to_string(),
                    "-bf",
                    "2",
                    "-b_strategy",
                    "0",
                    "-sc_threshold",
                    "0",
                ]
                .iter()
                .map(|argument| argument.to_string()),
            ),
            StandardEncoder::X265 => arguments.extend(
                [
                    "-vcodec",
                    "libx265",
                    "-pix_fmt",
                    "yuv420p",
                    "-preset",
                    &options.preset,
                    "-tune",
                    "zerolatency",
                    "-x265-params",
                    &format!(
                        "crf={}:keyint={}:verbose=1",
                        options.crf, options.keyframe_interval
                    ),
                ]
                .iter()
                .map(|argument| argument.to_string()),
            ),
        }

        arguments.push(output.display().to_string());
        arguments
    }

    /// Arguments for the decoding process, writing `rgb24` rawvideo to
    /// stdout.
    pub fn decode_arguments(&self, input: &Path) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            self.options.log_level.as_arg().to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "pipe:1".to_string(),
        ]
    }

    fn executable(&self) -> PathBuf {
        ffmpeg_executable(self.options.ffmpeg_path.as_deref())
    }

    fn encode(
        &self,
        frames: &[Frame],
        width: usize,
        height: usize,
        output: &Path,
    ) -> Result<(), CodecError> {
        let executable = self.executable();
        let arguments = self.encode_arguments(width, height, output);
        let command = describe(&executable, &arguments);
        log::debug!("Encoding {} frame(s): {command}", frames.len());

        let mut child = Command::new(&executable)
            .args(&arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| CodecError::ExternalProcess {
                command: command.clone(),
                reason: format!("failed to spawn: {error}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| CodecError::ExternalProcess {
            command: command.clone(),
            reason: "stdin unavailable".to_string(),
        })?;

        // Frames are written from a second thread while this one drains
        // stdout and stderr; a chatty encoder would otherwise fill its
        // stderr pipe and stop reading stdin.
        let (write_result, finished) = thread::scope(|scope| {
            let writer = scope.spawn(move || write_frames(stdin, frames));
            let finished = child.wait_with_output();
            let write_result = writer.join().unwrap_or_else(|_| {
                Err(CodecError::ExternalProcess {
                    command: command.clone(),
                    reason: "frame writer thread panicked".to_string(),
                })
            });
            (write_result, finished)
        });

        check_status(&command, &finished?)?;
        write_result.map_err(|error| match error {
            CodecError::Io(io) => CodecError::ExternalProcess {
                command: command.clone(),
                reason: format!("failed to write frames: {io}"),
            },
            other => other,
        })
    }

    fn decode(&self, input: &Path, width: usize, height: usize) -> Result<Vec<Frame>, CodecError> {
        let executable = self.executable();
        let arguments = self.decode_arguments(input);
        let command = describe(&executable, &arguments);
        log::debug!("Decoding {}: {command}", input.display());

        let output = Command::new(&executable)
            .args(&arguments)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| CodecError::ExternalProcess {
                command: command.clone(),
                reason: format!("failed to spawn: {error}"),
            })?;
        check_status(&command, &output)?;

        let frame_bytes = 3 * width * height;
        if frame_bytes == 0 || output.stdout.len() % frame_bytes != 0 {
            return Err(CodecError::ExternalProcess {
                command,
                reason: format!(
                    "decoded {} bytes, not a multiple of the {frame_bytes}-byte frame size",
                    output.stdout.len()
                ),
            });
        }

        output
            .stdout
            .chunks_exact(frame_bytes)
            .map(|chunk| Frame::from_rgb24_bytes(height, width, chunk))
            .collect()
    }
}

impl ClipCodec for StandardCodec {
    fn compress_clip(
        &mut self,
        frames: &[Frame],
        width: usize,
        height: usize,
    ) -> Result<ClipCompression, CodecError> {
        let working_directory = tempfile::tempdir()?;
        let container = working_directory.path().join(CONTAINER_NAME);

        self.encode(frames, width, height, &container)?;

        let total_bits = fs::metadata(&container)
            .map_err(|error| CodecError::ExternalProcess {
                command: describe(&self.executable(), &[]),
                reason: format!("no output file at {}: {error}", container.display()),
            })?
            .len()
            * 8;
        log::debug!(
            "{} produced {total_bits} bits for {} frame(s)",
            self.options.encoder,
            frames.len()
        );

        let decoded = self.decode(&container, width, height)?;
        Ok(ClipCompression {
            frames: decoded,
            total_bits,
        })
    }
}

/// Write every frame as rgb24, then close the pipe so the encoder sees end
/// of input.
fn write_frames(mut stdin: ChildStdin, frames: &[Frame]) -> Result<(), CodecError> {
    for frame in frames {
        stdin.write_all(&frame.to_rgb24_bytes()?)?;
    }
    Ok(())
}

fn describe(executable: &Path, arguments: &[String]) -> String {
    let mut command = executable.display().to_string();
    for argument in arguments {
        command.push(' ');
        command.push_str(argument);
    }
    command
}

fn check_status(command: &str, output: &Output) -> Result<(), CodecError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let last_line = stderr.lines().last().unwrap_or("").trim();
    Err(CodecError::ExternalProcess {
        command: command.to_string(),
        reason: if last_line.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {last_line}", output.status)
        },
    })
}

/// Per-frame rate when a container of `total_bits` holds `frame_count`
/// frames of `height * width` pixels: `total_bits / frame_count / (h * w)`.
pub fn uniform_rate(total_bits: u64, frame_count: usize, height: usize, width: usize) -> f64 {
    total_bits as f64 / frame_count as f64 / (height * width) as f64
}

/// `(mse, psnr)` for each `(raw, decoded)` pair, in clip order.
#[cfg(feature = "rayon")]
pub(crate) fn clip_distortion(
    raw: &[Frame],
    decoded: &[Frame],
) -> Result<Vec<(f64, f64)>, CodecError> {
    crate::rayon::parallel_distortion(raw, decoded)
}

/// `(mse, psnr)` for each `(raw, decoded)` pair, in clip order.
#[cfg(not(feature = "rayon"))]
pub(crate) fn clip_distortion(
    raw: &[Frame],
    decoded: &[Frame],
) -> Result<Vec<(f64, f64)>, CodecError> {
    raw.iter()
        .zip(decoded)
        .map(|(original, reconstructed)| {
            let mse = original.mse(reconstructed)?;
            Ok((mse, crate::frame::psnr_from_mse(mse)))
        })
        .collect()
}
