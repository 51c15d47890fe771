//! Cache update orchestrator.
//!
//! [`VideoCompressor`] is the entry point of the crate. It owns the active
//! clip's [`FrameCache`] and a [`CodecBackend`], and for every requested
//! frame decides whether any work is needed:
//!
//! - A frame at or below the `max_proc` watermark is already decodable; its
//!   cached metrics are returned without touching the codec.
//! - Otherwise the partitioner is asked for the next plan, starting just past
//!   the watermark, and the matching driver runs it. This repeats until the
//!   requested frame is decodable, so the decodable frames always form a
//!   prefix of the clip.
//!
//! Subprocess codecs bypass both drivers: the whole clip is encoded as soon
//! as it is started.
//!
//! # Example
//!
//! ```
//! use gopcache::{Clip, CodecBackend, CodecOptions, Frame, RawCodec, VideoCompressor};
//!
//! let options = CodecOptions::new().with_group_of_pictures(6, 6);
//! let mut compressor =
//!     VideoCompressor::new(options, CodecBackend::Sequential(Box::new(RawCodec)))?;
//! compressor.start_clip(Clip::new(vec![Frame::zeros(3, 16, 16); 100])?)?;
//!
//! compressor.request(4)?;
//! assert_eq!(compressor.max_proc(), Some(6));
//!
//! // Already decodable: served from the cache.
//! compressor.request(2)?;
//! assert_eq!(compressor.max_proc(), Some(6));
//! # Ok::<(), gopcache::CodecError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::cache::{CacheSnapshot, FrameCache, FrameMetrics, MetricSummary};
use crate::codec::{ClipCodec, CodecBackend};
use crate::configuration::CodecOptions;
use crate::error::CodecError;
use crate::frame::{Clip, Frame};
use crate::partition::FrameType;
use crate::progress::{OperationType, ProgressTracker};
use crate::standard::{clip_distortion, uniform_rate};
use crate::validation::validate_clip;
use crate::{parallel, progressive};

/// Lifecycle of the active clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipState {
    /// No clip has been started.
    Uninitialized,
    /// Frames are being served; more may need compressing.
    Streaming,
    /// Every frame of the clip has been compressed.
    Exhausted,
    /// An error interrupted compression. The cache is unusable until the
    /// next [`VideoCompressor::start_clip`].
    Aborted,
}

/// Serves compressed frames of a clip, compressing on demand.
pub struct VideoCompressor {
    options: CodecOptions,
    backend: CodecBackend,
    cache: Option<FrameCache>,
    state: ClipState,
}

impl Debug for VideoCompressor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoCompressor")
            .field("options", &self.options)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .field("max_seen", &self.max_seen())
            .field("max_proc", &self.max_proc())
            .finish()
    }
}

impl VideoCompressor {
    /// Create a compressor.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Configuration`] if `backend` does not implement
    /// the configured variant or the options fail validation.
    pub fn new(options: CodecOptions, backend: CodecBackend) -> Result<Self, CodecError> {
        if backend.variant() != options.variant {
            return Err(CodecError::Configuration(format!(
                "{} options given a {} backend",
                options.variant,
                backend.variant()
            )));
        }

        options.validate().check()?;

        Ok(Self {
            options,
            backend,
            cache: None,
            state: ClipState::Uninitialized,
        })
    }

    /// The options this compressor was built with.
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Begin a new clip, discarding the previous cache and recurrent state.
    ///
    /// With a subprocess backend the whole clip is encoded here and every
    /// frame is given the same rate, `total_bits / N / (h * w)`.
    ///
    /// # Errors
    ///
    /// - [`CodecError::Configuration`] if the clip fails validation.
    /// - [`CodecError::ExternalProcess`] or
    ///   [`CodecError::ClipLengthMismatch`] from the subprocess codec. The
    ///   clip is then aborted.
    pub fn start_clip(&mut self, clip: Clip) -> Result<(), CodecError> {
        if let Err(error) = validate_clip(clip.frames()).check() {
            self.cache = None;
            self.state = ClipState::Uninitialized;
            return Err(error);
        }

        let (channels, height, width) = clip.shape();
        log::debug!(
            "Starting clip of {} frame(s), {channels}x{height}x{width}, {} variant",
            clip.len(),
            self.options.variant,
        );

        let mut cache = FrameCache::new(clip);
        self.state = ClipState::Streaming;

        if let CodecBackend::Subprocess(codec) = &mut self.backend {
            if let Err(error) = encode_whole_clip(&mut cache, codec.as_mut(), &self.options) {
                log::warn!("Clip aborted: {error}");
                self.cache = None;
                self.state = ClipState::Aborted;
                return Err(error);
            }
            self.state = ClipState::Exhausted;
        }

        self.cache = Some(cache);
        Ok(())
    }

    /// Make frame `index` decodable and return its metrics.
    ///
    /// Requests at or below [`max_proc`](Self::max_proc) never invoke the
    /// codec.
    ///
    /// # Errors
    ///
    /// - [`CodecError::NoActiveClip`] before the first
    ///   [`start_clip`](Self::start_clip).
    /// - [`CodecError::ClipAborted`] after an earlier failure.
    /// - [`CodecError::FrameOutOfRange`] if `index` is past the clip. The
    ///   clip stays usable.
    /// - Any codec or scheduling error, which aborts the clip.
    pub fn request(&mut self, index: usize) -> Result<FrameMetrics, CodecError> {
        match self.state {
            ClipState::Uninitialized => return Err(CodecError::NoActiveClip),
            ClipState::Aborted => return Err(CodecError::ClipAborted),
            ClipState::Streaming | ClipState::Exhausted => {}
        }

        let clip_len = self.cache.as_ref().map_or(0, FrameCache::len);
        if index >= clip_len {
            return Err(CodecError::FrameOutOfRange {
                frame: index,
                clip_len,
            });
        }

        match self.update_cache(index) {
            Ok(metrics) => Ok(metrics),
            Err(error) => {
                log::warn!("Clip aborted while serving frame {index}: {error}");
                self.state = ClipState::Aborted;
                Err(error)
            }
        }
    }

    /// Make the sampled window ending at `last` decodable and return its
    /// mean metrics.
    ///
    /// The window holds `clip_duration` frames spaced `sampling_rate` apart,
    /// `last - (clip_duration - 1) * sampling_rate ..= last`, with indices
    /// before the clip start clamped to 0.
    ///
    /// # Errors
    ///
    /// [`CodecError::Configuration`] for a zero duration or sampling rate,
    /// otherwise as for [`request`](Self::request).
    pub fn request_window(
        &mut self,
        last: usize,
        clip_duration: usize,
        sampling_rate: usize,
    ) -> Result<MetricSummary, CodecError> {
        if clip_duration == 0 || sampling_rate == 0 {
            return Err(CodecError::Configuration(format!(
                "window needs a positive duration and sampling rate (got {clip_duration}, {sampling_rate})"
            )));
        }

        self.request(last)?;
        let indices: Vec<usize> = (0..clip_duration)
            .rev()
            .map(|step| last.saturating_sub(step * sampling_rate))
            .collect();
        self.cache
            .as_ref()
            .and_then(|cache| cache.window_mean(&indices))
            .ok_or(CodecError::NoActiveClip)
    }

    /// The reconstructed frame at `index`, if it is decodable.
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        let cache = self.usable_cache()?;
        if !cache.is_decodable(index) {
            return None;
        }
        cache.slot(index).ok().map(|slot| slot.frame())
    }

    /// Metrics recorded for `index`, if it is decodable.
    pub fn metrics(&self, index: usize) -> Option<&FrameMetrics> {
        let cache = self.usable_cache()?;
        if !cache.is_decodable(index) {
            return None;
        }
        cache.metrics(index)
    }

    /// Every decodable frame with its metrics.
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.usable_cache().map(FrameCache::snapshot)
    }

    /// Highest index requested on the active clip.
    pub fn max_seen(&self) -> Option<usize> {
        self.cache.as_ref().and_then(FrameCache::max_seen)
    }

    /// Highest decodable index on the active clip.
    pub fn max_proc(&self) -> Option<usize> {
        self.cache.as_ref().and_then(FrameCache::max_proc)
    }

    /// Lifecycle state of the active clip.
    pub fn state(&self) -> ClipState {
        self.state
    }

    /// The active clip's cache. `None` before the first clip or after an
    /// abort.
    pub fn cache(&self) -> Option<&FrameCache> {
        self.usable_cache()
    }

    fn usable_cache(&self) -> Option<&FrameCache> {
        match self.state {
            ClipState::Streaming | ClipState::Exhausted => self.cache.as_ref(),
            ClipState::Uninitialized | ClipState::Aborted => None,
        }
    }

    fn update_cache(&mut self, index: usize) -> Result<FrameMetrics, CodecError> {
        let cache = self.cache.as_mut().ok_or(CodecError::NoActiveClip)?;
        let clip_len = cache.len();
        let layout = self.options.group_of_pictures;

        while !cache.is_decodable(index) {
            let start_new_clip = cache.max_proc().is_none();
            let cursor = cache.max_proc().map_or(0, |max_proc| max_proc + 1);

            match &mut self.backend {
                CodecBackend::Sequential(codec) => {
                    let plan = layout.plan(cursor, clip_len, start_new_clip)?;
                    let mut tracker = ProgressTracker::new(
                        self.options.progress.clone(),
                        OperationType::SequentialCompression,
                        plan.frame_count(),
                        self.options.report_interval,
                    );
                    for range in &plan.ranges {
                        progressive::compress_range(cache, codec.as_mut(), range, &mut tracker)?;
                    }
                    tracker.finish();
                    cache.advance(index, plan.max_proc);
                }
                CodecBackend::Batch(codec) => {
                    let plan = layout.plan_batch(
                        cursor,
                        clip_len,
                        self.options.batch_size,
                        start_new_clip,
                    )?;
                    log::debug!("Planned batch {plan:?} for frame {index} of {clip_len}");
                    let mut tracker = ProgressTracker::new(
                        self.options.progress.clone(),
                        OperationType::ParallelCompression,
                        plan.len(),
                        self.options.report_interval,
                    );
                    parallel::compress_batch(cache, codec.as_mut(), plan, &mut tracker)?;
                    tracker.finish();
                    cache.advance(index, plan.max_proc());
                }
                // A subprocess clip is complete once started; a gap here means
                // the encode never finished.
                CodecBackend::Subprocess(_) => return Err(CodecError::ClipAborted),
            }
        }

        if let Some(max_proc) = cache.max_proc() {
            cache.advance(index, max_proc);
            if max_proc + 1 == clip_len {
                self.state = ClipState::Exhausted;
            }
        }

        cache
            .metrics(index)
            .cloned()
            .ok_or(CodecError::DependencyViolation {
                frame: index,
                reference: index,
                watermark: cache.max_proc(),
            })
    }
}

/// Encode every frame of `cache` with one subprocess call and record the
/// results.
fn encode_whole_clip(
    cache: &mut FrameCache,
    codec: &mut dyn ClipCodec,
    options: &CodecOptions,
) -> Result<(), CodecError> {
    let clip_len = cache.len();
    let (_, height, width) = cache.shape();
    let raw = (0..clip_len)
        .map(|index| cache.raw(index).cloned())
        .collect::<Result<Vec<Frame>, CodecError>>()?;

    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        OperationType::ClipEncoding,
        clip_len,
        options.report_interval,
    );

    let output = codec.compress_clip(&raw, width, height)?;
    if output.frames.len() != clip_len {
        return Err(CodecError::ClipLengthMismatch {
            expected: clip_len,
            actual: output.frames.len(),
        });
    }

    let rate = uniform_rate(output.total_bits, clip_len, height, width);
    let distortion = clip_distortion(&raw, &output.frames)?;
    log::debug!(
        "Clip encoded in {} bits ({rate:.4} bpp per frame)",
        output.total_bits
    );

    // Container bits are not differentiable, so only the measured rate and
    // quality are recorded; the trainable loss terms stay zero.
    for (index, (frame, (_, psnr))) in output.frames.into_iter().zip(distortion).enumerate() {
        let metrics = FrameMetrics {
            bits_estimated: 0.0,
            bits_actual: rate,
            distortion_loss: 0.0,
            auxiliary_loss: 0.0,
            flow_loss: 0.0,
            quality: psnr,
            frame_type: if index == 0 {
                FrameType::Intra
            } else {
                FrameType::ForwardPredicted
            },
            reference: None,
            end_of_batch: false,
        };
        cache.record(index, frame, metrics)?;
        tracker.advance(index);
    }
    tracker.finish();
    cache.complete();
    Ok(())
}
