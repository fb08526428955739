//! Image containers shared by the detection and recognition stages.
//!
//! Pixels are kept in the byte order of the caller's buffer: blue, green, red
//! and an optional alpha. Nothing in the pipeline reorders channels until the
//! tensor is built.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Luma, Rgb, Rgba};

use crate::engine::EngineError;

/// Borrowed view of a caller-owned bitmap.
#[derive(Clone, Copy, Debug)]
pub struct PixelBuffer<'a> {
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 3 (BGR) or 4 (BGRA).
    pub channels: u8,
    /// Bytes from the start of one row to the start of the next.
    pub stride: usize,
    pub data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
    pub fn new(width: u32, height: u32, channels: u8, stride: usize, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            channels,
            stride,
            data,
        }
    }

    /// A buffer whose rows are tightly packed.
    pub fn packed(width: u32, height: u32, channels: u8, data: &'a [u8]) -> Self {
        Self::new(width, height, channels, width as usize * channels as usize, data)
    }
}

#[derive(Clone)]
pub struct Mat {
    image: DynamicImage,
}

impl Default for Mat {
    fn default() -> Self {
        Self {
            image: DynamicImage::new_rgb8(0, 0),
        }
    }
}

impl Mat {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Copies a caller bitmap, dropping any row padding.
    pub fn from_pixels(buf: &PixelBuffer<'_>) -> Result<Self, EngineError> {
        if buf.width == 0 || buf.height == 0 {
            return Err(EngineError::EmptyImage);
        }
        if !matches!(buf.channels, 1 | 3 | 4) {
            return Err(EngineError::UnsupportedChannels(buf.channels));
        }

        let row_len = buf.width as usize * buf.channels as usize;
        if buf.stride < row_len {
            return Err(EngineError::InvalidBuffer(format!(
                "stride {} shorter than row of {} bytes",
                buf.stride, row_len
            )));
        }
        let needed = buf.stride * (buf.height as usize - 1) + row_len;
        if buf.data.len() < needed {
            return Err(EngineError::InvalidBuffer(format!(
                "{} bytes supplied, {} required",
                buf.data.len(),
                needed
            )));
        }

        let mut packed = Vec::with_capacity(row_len * buf.height as usize);
        for row in buf.data.chunks(buf.stride).take(buf.height as usize) {
            packed.extend_from_slice(&row[..row_len]);
        }

        let (w, h) = (buf.width, buf.height);
        let image = match buf.channels {
            1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, packed).map(DynamicImage::ImageLuma8),
            3 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, packed).map(DynamicImage::ImageRgb8),
            _ => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, packed).map(DynamicImage::ImageRgba8),
        }
        .ok_or_else(|| EngineError::InvalidBuffer("pixel data does not match dimensions".into()))?;

        Ok(Self { image })
    }

    pub fn rows(&self) -> u32 {
        self.image.height()
    }

    pub fn cols(&self) -> u32 {
        self.image.width()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Tightly packed pixel bytes, row by row.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn as_pixels(&self) -> PixelBuffer<'_> {
        PixelBuffer::packed(self.cols(), self.rows(), self.channels(), self.as_bytes())
    }

    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Mat {
        Mat::new(self.image.crop_imm(x, y, width, height))
    }

    /// Bilinear resize to exactly `width` x `height`.
    pub fn resize(&self, width: u32, height: u32) -> Mat {
        Mat::new(self.image.resize_exact(width, height, FilterType::Triangle))
    }
}

/// Decodes an image file into BGR (or BGRA when the file has alpha).
pub fn imread<P: AsRef<Path>>(path: P) -> Result<Mat, EngineError> {
    let img = image::open(path)?;
    let image = if img.color().has_alpha() {
        let mut buf = img.to_rgba8();
        buf.pixels_mut().for_each(|p| p.0.swap(0, 2));
        DynamicImage::ImageRgba8(buf)
    } else {
        let mut buf = img.to_rgb8();
        buf.pixels_mut().for_each(|p| p.0.swap(0, 2));
        DynamicImage::ImageRgb8(buf)
    };
    Ok(Mat::new(image))
}
