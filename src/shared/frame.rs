// This is free and unencumbered software released into the public domain.

use crate::shared::CaptureSize;
use bytes::Bytes;
use derive_more::Display;
use image::RgbImage;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum PixelFormat {
    /// YCrCb 4:2:0, full-resolution Y plane followed by interleaved V/U.
    #[display("nv21")]
    Nv21,
    #[display("rgb24")]
    Rgb8,
}

impl PixelFormat {
    /// Bytes needed for one `width`x`height` image in this format.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Nv21 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
            PixelFormat::Rgb8 => w * h * 3,
        }
    }
}

/// One captured frame plus the metadata resolved for its capture session.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub device_index: usize,
    pub is_front_facing: bool,
    pub pixel_format: PixelFormat,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl Frame {
    pub fn size(&self) -> CaptureSize {
        CaptureSize::new(self.width, self.height)
    }

    /// Converts the pixel buffer to RGB, or `None` if the buffer is shorter
    /// than its declared format requires.
    pub fn to_rgb8(&self) -> Option<RgbImage> {
        let (width, height) = (self.width, self.height);
        if self.data.len() < self.pixel_format.frame_len(width, height) {
            return None;
        }
        match self.pixel_format {
            PixelFormat::Rgb8 => {
                let len = self.pixel_format.frame_len(width, height);
                RgbImage::from_raw(width, height, self.data[..len].to_vec())
            },
            PixelFormat::Nv21 => Some(nv21_to_rgb(&self.data, width, height)),
        }
    }
}

fn nv21_to_rgb(data: &[u8], width: u32, height: u32) -> RgbImage {
    let (w, h) = (width as usize, height as usize);
    let chroma = &data[w * h..];
    let chroma_stride = 2 * w.div_ceil(2);

    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let luma = data[y * w + x] as f32;
        let offset = (y / 2) * chroma_stride + (x / 2) * 2;
        let v = chroma[offset] as f32 - 128.0;
        let u = chroma[offset + 1] as f32 - 128.0;

        let r = luma + 1.402 * v;
        let g = luma - 0.344_136 * u - 0.714_136 * v;
        let b = luma + 1.772 * u;
        image::Rgb([clamp(r), clamp(g), clamp(b)])
    })
}

#[inline]
fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
