//! Texture images and loading from disk.
//!
//! Decoding goes through the `image` crate. Loading never leaves the caller
//! without a texture: if the file cannot be decoded the failure is logged and
//! a blank texture is created in its place, so materials can bind it the same
//! way either way.

use std::path::Path;

use image::DynamicImage;
use tracing::{error, info};

use crate::backend::{GraphicsBackend, TextureHandle};
use crate::error::{RenderError, Result};

/// Pixel layout of a [`TextureImage`]. Eight bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8,
    Rgb8,
    Rgba8,
}

impl TextureFormat {
    /// Maps a decoder channel count to a format.
    ///
    /// # Errors
    ///
    /// [`RenderError::UnsupportedChannelLayout`] for anything but 1, 3 or 4.
    pub fn from_channels(channels: u8) -> Result<Self> {
        match channels {
            1 => Ok(TextureFormat::R8),
            3 => Ok(TextureFormat::Rgb8),
            4 => Ok(TextureFormat::Rgba8),
            other => Err(RenderError::UnsupportedChannelLayout { channels: other }),
        }
    }

    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgb8 => 3,
            TextureFormat::Rgba8 => 4,
        }
    }
}

/// Decoded pixels ready for upload, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Colour data is sRGB encoded. Single channel images are always linear.
    pub srgb: bool,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// Wraps raw decoder output.
    ///
    /// # Errors
    ///
    /// [`RenderError::UnsupportedChannelLayout`] for channel counts other than
    /// 1, 3 or 4, and [`RenderError::TextureLoadFailed`] when `pixels` does not
    /// hold `width * height * channels` bytes.
    pub fn from_raw(width: u32, height: u32, channels: u8, pixels: Vec<u8>, gamma: bool) -> Result<Self> {
        let format = TextureFormat::from_channels(channels)?;
        let expected = width as usize * height as usize * format.channels();
        if pixels.len() != expected || expected == 0 {
            return Err(RenderError::TextureLoadFailed {
                path: "<memory>".into(),
                reason: format!("expected {expected} bytes of pixel data, got {}", pixels.len()),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            srgb: gamma && format != TextureFormat::R8,
            pixels,
        })
    }

    /// Converts a decoded image, keeping its channel count.
    ///
    /// Higher bit depths are reduced to eight bits per channel.
    ///
    /// # Errors
    ///
    /// [`RenderError::UnsupportedChannelLayout`] for luma+alpha images.
    pub fn from_dynamic(image: DynamicImage, gamma: bool) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        let channels = image.color().channel_count();
        let pixels = match channels {
            1 => image.into_luma8().into_raw(),
            3 => image.into_rgb8().into_raw(),
            4 => image.into_rgba8().into_raw(),
            other => return Err(RenderError::UnsupportedChannelLayout { channels: other }),
        };
        Self::from_raw(width, height, channels, pixels, gamma)
    }

    /// Same image with every pixel widened to RGBA.
    #[must_use]
    pub fn to_rgba(&self) -> Vec<u8> {
        match self.format {
            TextureFormat::Rgba8 => self.pixels.clone(),
            TextureFormat::Rgb8 => self
                .pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], u8::MAX])
                .collect(),
            TextureFormat::R8 => self.pixels.iter().flat_map(|&v| [v, v, v, u8::MAX]).collect(),
        }
    }

    /// Number of levels in a full mip chain down to 1x1.
    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Full mip chain, level 0 first, each level a 2x2 box filter of the one
    /// above it.
    #[must_use]
    pub fn mip_chain(&self) -> Vec<TextureImage> {
        let mut levels = vec![self.clone()];
        while let Some(next) = levels.last().and_then(TextureImage::downsample) {
            levels.push(next);
        }
        levels
    }

    fn downsample(&self) -> Option<TextureImage> {
        if self.width == 1 && self.height == 1 {
            return None;
        }
        let channels = self.format.channels();
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let src_w = self.width as usize;
        let src_h = self.height as usize;
        let mut pixels = Vec::with_capacity(width as usize * height as usize * channels);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let xs = [(2 * x).min(src_w - 1), (2 * x + 1).min(src_w - 1)];
                let ys = [(2 * y).min(src_h - 1), (2 * y + 1).min(src_h - 1)];
                for c in 0..channels {
                    let sum: u32 = ys
                        .iter()
                        .flat_map(|&sy| xs.iter().map(move |&sx| (sy * src_w + sx) * channels + c))
                        .map(|i| u32::from(self.pixels[i]))
                        .sum();
                    // Four samples, rounded to nearest.
                    pixels.push(u8::try_from((sum + 2) / 4).unwrap_or(u8::MAX));
                }
            }
        }
        Some(TextureImage {
            width,
            height,
            format: self.format,
            srgb: self.srgb,
            pixels,
        })
    }
}

/// Decodes an image file.
///
/// # Errors
///
/// [`RenderError::TextureLoadFailed`] naming the path when the file cannot be
/// opened or decoded, [`RenderError::UnsupportedChannelLayout`] for two
/// channel images.
pub fn decode_texture(path: &Path, gamma: bool) -> Result<TextureImage> {
    let image = image::open(path).map_err(|e| RenderError::TextureLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    TextureImage::from_dynamic(image, gamma)
}

/// Loads a texture, falling back to a blank one when decoding fails.
///
/// The returned handle is always valid.
pub fn load_texture<B: GraphicsBackend + ?Sized>(backend: &mut B, path: &Path, gamma: bool) -> TextureHandle {
    match decode_texture(path, gamma) {
        Ok(image) => {
            info!(
                path = %path.display(),
                width = image.width,
                height = image.height,
                format = ?image.format,
                "loaded texture"
            );
            backend.create_texture(Some(&image))
        }
        Err(e) => {
            error!("Texture failed to load at path {}: {e}", path.display());
            backend.create_texture(None)
        }
    }
}
