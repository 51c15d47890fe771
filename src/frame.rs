//! Frames and clips.
//!
//! A [`Frame`] is a planar `f32` image with values in `[0, 1]`, the layout a
//! learned codec consumes. A [`Clip`] is the immutable, shape-checked input
//! sequence handed to [`VideoCompressor::start_clip`](crate::VideoCompressor::start_clip).

use image::RgbImage;

use crate::error::CodecError;

/// A single planar frame (`channels × height × width`).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl Frame {
    /// Wrap planar data.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FrameShapeMismatch`] if `data` does not hold
    /// exactly `channels * height * width` values.
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        data: Vec<f32>,
    ) -> Result<Self, CodecError> {
        if data.len() != channels * height * width {
            return Err(CodecError::FrameShapeMismatch {
                expected: (channels, height, width),
                actual: (data.len(), 1, 1),
            });
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// An all-zero frame.
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self::filled(channels, height, width, 0.0)
    }

    /// A frame where every sample is `value`.
    pub fn filled(channels: usize, height: usize, width: usize, value: f32) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![value; channels * height * width],
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// `(channels, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    /// Number of pixels (`height * width`).
    pub fn pixel_count(&self) -> usize {
        self.height * self.width
    }

    /// Planar samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable planar samples.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Convert an 8-bit RGB image to a 3-channel planar frame.
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let plane = width * height;
        let mut data = vec![0.0; 3 * plane];
        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for channel in 0..3 {
                data[channel * plane + offset] = f32::from(pixel[channel]) / 255.0;
            }
        }
        Self {
            channels: 3,
            height,
            width,
            data,
        }
    }

    /// Convert a 3-channel frame to an 8-bit RGB image, clamping to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FrameShapeMismatch`] for frames that are not
    /// 3-channel.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CodecError> {
        let bytes = self.to_rgb24_bytes()?;
        RgbImage::from_raw(self.width as u32, self.height as u32, bytes).ok_or(
            CodecError::FrameShapeMismatch {
                expected: (3, self.height, self.width),
                actual: self.shape(),
            },
        )
    }

    /// Pack a 3-channel frame as interleaved `rgb24` bytes (the layout
    /// ffmpeg's `rawvideo` demuxer reads).
    pub fn to_rgb24_bytes(&self) -> Result<Vec<u8>, CodecError> {
        self.expect_rgb()?;
        let plane = self.pixel_count();
        let mut bytes = Vec::with_capacity(3 * plane);
        for offset in 0..plane {
            for channel in 0..3 {
                let sample = self.data[channel * plane + offset].clamp(0.0, 1.0);
                bytes.push((sample * 255.0).round() as u8);
            }
        }
        Ok(bytes)
    }

    /// Unpack interleaved `rgb24` bytes into a 3-channel planar frame.
    pub fn from_rgb24_bytes(height: usize, width: usize, bytes: &[u8]) -> Result<Self, CodecError> {
        let plane = height * width;
        if bytes.len() != 3 * plane {
            return Err(CodecError::FrameShapeMismatch {
                expected: (3, height, width),
                actual: (bytes.len(), 1, 1),
            });
        }
        let mut data = vec![0.0; 3 * plane];
        for (offset, pixel) in bytes.chunks_exact(3).enumerate() {
            for channel in 0..3 {
                data[channel * plane + offset] = f32::from(pixel[channel]) / 255.0;
            }
        }
        Ok(Self {
            channels: 3,
            height,
            width,
            data,
        })
    }

    /// Mean squared error against another frame of the same shape.
    pub fn mse(&self, other: &Frame) -> Result<f64, CodecError> {
        self.expect_shape(other.shape())?;
        if self.data.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| {
                let diff = f64::from(*a) - f64::from(*b);
                diff * diff
            })
            .sum();
        Ok(sum / self.data.len() as f64)
    }

    /// Peak signal-to-noise ratio in dB for a peak value of 1.
    ///
    /// Identical frames yield `f64::INFINITY`.
    pub fn psnr(&self, other: &Frame) -> Result<f64, CodecError> {
        Ok(psnr_from_mse(self.mse(other)?))
    }

    pub(crate) fn expect_shape(&self, expected: (usize, usize, usize)) -> Result<(), CodecError> {
        if self.shape() == expected {
            Ok(())
        } else {
            Err(CodecError::FrameShapeMismatch {
                expected,
                actual: self.shape(),
            })
        }
    }

    fn expect_rgb(&self) -> Result<(), CodecError> {
        self.expect_shape((3, self.height, self.width))
    }
}

/// An ordered, immutable sequence of same-shaped raw frames.
#[derive(Debug, Clone)]
pub struct Clip {
    frames: Vec<Frame>,
}

impl Clip {
    /// Build a clip.
    ///
    /// # Errors
    ///
    /// - [`CodecError::EmptyClip`] if `frames` is empty.
    /// - [`CodecError::FrameShapeMismatch`] if any frame differs in shape
    ///   from the first.
    pub fn new(frames: Vec<Frame>) -> Result<Self, CodecError> {
        let first = frames.first().ok_or(CodecError::EmptyClip)?.shape();
        for frame in &frames {
            frame.expect_shape(first)?;
        }
        Ok(Self { frames })
    }

    /// Number of frames (`clip_len`).
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; an empty clip cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Shared `(channels, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.frames[0].shape()
    }

    /// Borrow the frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Take ownership of the frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

/// PSNR in dB for a peak value of 1. Zero error yields `f64::INFINITY`.
pub(crate) fn psnr_from_mse(mse: f64) -> f64 {
    10.0 * (1.0 / mse).log10()
}
