// Image loading module
// Decodes image files into raw pixels and remaps channels for upload

use crate::error::BoardError;
use anyhow::{Context, Result};
use image::DynamicImage;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Decoded image pixels, tightly packed, 8 bits per channel
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of channels per pixel in `pixels`
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// Fixed component remapping from a source channel layout to RGBA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swizzle {
    /// Grey replicated to RGB, fully opaque
    Luma,
    /// Grey replicated to RGB, second channel as alpha
    LumaAlpha,
    /// RGB, fully opaque
    Rgb,
    Rgba,
}

impl Swizzle {
    /// Pick the remapping for a channel count; unknown layouts use the first channel as grey
    pub fn from_channels(channels: u8) -> Self {
        match channels {
            2 => Swizzle::LumaAlpha,
            3 => Swizzle::Rgb,
            4 => Swizzle::Rgba,
            _ => Swizzle::Luma,
        }
    }

    fn apply(self, px: &[u8]) -> [u8; 4] {
        match self {
            Swizzle::Luma => [px[0], px[0], px[0], u8::MAX],
            Swizzle::LumaAlpha => [px[0], px[0], px[0], px[1]],
            Swizzle::Rgb => [px[0], px[1], px[2], u8::MAX],
            Swizzle::Rgba => [px[0], px[1], px[2], px[3]],
        }
    }
}

impl DecodedImage {
    pub fn swizzle(&self) -> Swizzle {
        Swizzle::from_channels(self.channels)
    }

    /// Check that the pixel buffer can be uploaded as a texture
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.channels == 0 {
            return Err("image has no channels".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid size {}x{}", self.width, self.height));
        }
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.pixels.len() < expected {
            return Err(format!(
                "pixel buffer holds {} bytes, {} expected",
                self.pixels.len(),
                expected
            ));
        }
        Ok(())
    }

    /// Expand to RGBA (4 bytes per pixel) using the channel remapping
    pub fn to_rgba(&self) -> Vec<u8> {
        let channels = self.channels.max(1) as usize;
        let swizzle = self.swizzle();
        let count = self.width as usize * self.height as usize;
        let mut rgba = Vec::with_capacity(count * 4);
        for px in self.pixels.chunks_exact(channels).take(count) {
            rgba.extend_from_slice(&swizzle.apply(px));
        }
        rgba
    }
}

/// Read and decode an image file
pub fn read_image(path: &Path) -> std::result::Result<DecodedImage, BoardError> {
    let data = fs::read(path).map_err(|e| BoardError::DecodeFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if data.is_empty() {
        return Err(BoardError::DecodeFailure {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }
    decode(&data).map_err(|e| BoardError::DecodeFailure {
        path: path.to_path_buf(),
        reason: format!("{:#}", e),
    })
}

/// Decode an image from raw bytes, auto-detecting the format
pub fn decode(data: &[u8]) -> Result<DecodedImage> {
    let format = image::guess_format(data).context("Failed to detect image format")?;

    let cursor = Cursor::new(data);
    let img = image::load(cursor, format).context("Failed to decode image")?;

    Ok(from_dynamic(img))
}

/// Keep the source channel count, narrowing deeper formats to 8 bits
fn from_dynamic(img: DynamicImage) -> DecodedImage {
    let (width, height) = (img.width(), img.height());
    let (channels, pixels) = match img.color().channel_count() {
        1 => (1, img.into_luma8().into_raw()),
        2 => (2, img.into_luma_alpha8().into_raw()),
        3 => (3, img.into_rgb8().into_raw()),
        _ => (4, img.into_rgba8().into_raw()),
    };
    DecodedImage {
        width,
        height,
        channels,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA, Rgb, RgbImage};
    use tempfile::tempdir;

    fn decoded(channels: u8, pixels: Vec<u8>) -> DecodedImage {
        DecodedImage {
            width: 1,
            height: 1,
            channels,
            pixels,
        }
    }

    #[test]
    fn channel_layouts_remap_to_rgba() {
        assert_eq!(decoded(1, vec![7]).to_rgba(), vec![7, 7, 7, 255]);
        assert_eq!(decoded(2, vec![7, 9]).to_rgba(), vec![7, 7, 7, 9]);
        assert_eq!(decoded(3, vec![1, 2, 3]).to_rgba(), vec![1, 2, 3, 255]);
        assert_eq!(decoded(4, vec![1, 2, 3, 4]).to_rgba(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unknown_layout_uses_first_channel_as_grey() {
        assert_eq!(Swizzle::from_channels(5), Swizzle::Luma);
        assert_eq!(decoded(5, vec![8, 1, 2, 3, 4]).to_rgba(), vec![8, 8, 8, 255]);
    }

    #[test]
    fn validate_rejects_empty_layouts() {
        assert!(decoded(0, vec![]).validate().is_err());
        assert!(decoded(3, vec![1, 2]).validate().is_err());
        assert!(decoded(3, vec![1, 2, 3]).validate().is_ok());
    }

    #[test]
    fn png_keeps_its_channel_count() {
        let dir = tempdir().expect("failed to create temp dir");
        let rgb_path = dir.path().join("rgb.png");
        let la_path = dir.path().join("la.png");
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]))
            .save(&rgb_path)
            .expect("failed to write png");
        GrayAlphaImage::from_pixel(2, 2, LumaA([50, 128]))
            .save(&la_path)
            .expect("failed to write png");

        let rgb = read_image(&rgb_path).expect("failed to decode rgb");
        assert_eq!((rgb.width, rgb.height, rgb.channels), (3, 2, 3));
        assert_eq!(&rgb.pixels[..3], &[10, 20, 30]);

        let la = read_image(&la_path).expect("failed to decode luma alpha");
        assert_eq!(la.channels, 2);
        assert_eq!(&la.to_rgba()[..4], &[50, 50, 50, 128]);
    }

    #[test]
    fn garbage_and_missing_files_are_decode_failures() {
        let dir = tempdir().expect("failed to create temp dir");
        let junk = dir.path().join("junk.png");
        fs::write(&junk, b"definitely not an image").expect("failed to write");

        assert!(matches!(
            read_image(&junk),
            Err(BoardError::DecodeFailure { .. })
        ));
        assert!(matches!(
            read_image(&dir.path().join("missing.png")),
            Err(BoardError::DecodeFailure { .. })
        ));
    }
}
