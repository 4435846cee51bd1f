//! Greyscale conversion of captured frames for symbol detection

use thiserror::Error;
use zune_jpeg::JpegDecoder;

use super::frame::{Frame, PixelFormat};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("frame has zero width or height")]
    Empty,
    #[error("frame data truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("stride {stride} is shorter than a {width} pixel row")]
    Stride { stride: usize, width: usize },
    #[error("MJPEG decode failed: {0}")]
    Jpeg(String),
}

/// Tightly packed 8-bit luminance image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumaImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl LumaImage {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }
}

pub fn to_luma(frame: &Frame) -> Result<LumaImage, ConvertError> {
    let meta = &frame.meta;
    let width = meta.width as usize;
    let height = meta.height as usize;
    let data = &frame.data[..];

    let Some(bpp) = meta.format.bytes_per_pixel() else {
        return decode_mjpeg(data);
    };

    if width == 0 || height == 0 {
        return Err(ConvertError::Empty);
    }

    let packed = width * bpp as usize;
    let stride = match meta.stride as usize {
        0 => packed,
        s if s < packed => return Err(ConvertError::Stride { stride: s, width }),
        s => s,
    };

    let expected = stride * (height - 1) + packed;
    if data.len() < expected {
        return Err(ConvertError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    let mut pixels = Vec::with_capacity(width * height);
    for row in data.chunks(stride).take(height) {
        let row = &row[..packed];
        match meta.format {
            // NV12 carries its luma plane first
            PixelFormat::Luma8 | PixelFormat::Nv12 => pixels.extend_from_slice(row),
            PixelFormat::Yuyv4 => pixels.extend(row.iter().step_by(2)),
            PixelFormat::Rgb24 => pixels.extend(row.chunks_exact(3).map(|p| luma(p[0], p[1], p[2]))),
            PixelFormat::Bgr24 => pixels.extend(row.chunks_exact(3).map(|p| luma(p[2], p[1], p[0]))),
            PixelFormat::Mjpeg => unreachable!("compressed formats have no bytes per pixel"),
        }
    }

    Ok(LumaImage {
        width,
        height,
        pixels,
    })
}

fn decode_mjpeg(data: &[u8]) -> Result<LumaImage, ConvertError> {
    let mut decoder = JpegDecoder::new(data);
    let decoded = decoder
        .decode()
        .map_err(|e| ConvertError::Jpeg(format!("{:?}", e)))?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| ConvertError::Jpeg("missing dimensions".into()))?;

    let count = width * height;
    if count == 0 {
        return Err(ConvertError::Empty);
    }

    let channels = decoded.len() / count;
    let pixels = match channels {
        1 => decoded,
        3 | 4 => decoded
            .chunks_exact(channels)
            .map(|p| luma(p[0], p[1], p[2]))
            .collect(),
        _ => {
            return Err(ConvertError::Truncated {
                expected: count * 3,
                actual: decoded.len(),
            })
        }
    };

    Ok(LumaImage {
        width,
        height,
        pixels,
    })
}

// ITU-R BT.601: (77R + 150G + 29B) >> 8
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::capture::frame::{FrameMetadata, Rotation};

    fn frame(format: PixelFormat, width: u32, height: u32, stride: u32, data: Vec<u8>) -> Frame {
        Frame::new(
            Bytes::from(data),
            FrameMetadata {
                sequence: 1,
                width,
                height,
                stride,
                format,
                rotation: Rotation::Deg0,
                device_timestamp: None,
            },
        )
    }

    #[test]
    fn rgb_and_bgr_agree() {
        let rgb = frame(PixelFormat::Rgb24, 2, 1, 0, vec![255, 0, 0, 0, 0, 255]);
        let bgr = frame(PixelFormat::Bgr24, 2, 1, 0, vec![0, 0, 255, 255, 0, 0]);
        let a = to_luma(&rgb).unwrap();
        assert_eq!(a, to_luma(&bgr).unwrap());
        assert_eq!(a.pixels, vec![76, 28]);
    }

    #[test]
    fn yuyv_keeps_the_y_samples() {
        let yuyv = frame(PixelFormat::Yuyv4, 2, 1, 0, vec![10, 128, 20, 128]);
        assert_eq!(to_luma(&yuyv).unwrap().pixels, vec![10, 20]);
    }

    #[test]
    fn stride_padding_is_skipped() {
        let luma = frame(PixelFormat::Luma8, 2, 2, 4, vec![1, 2, 99, 99, 3, 4]);
        let image = to_luma(&luma).unwrap();
        assert_eq!(image.pixels, vec![1, 2, 3, 4]);
        assert_eq!(image.get(1, 1), 4);
    }

    #[test]
    fn nv12_reads_the_luma_plane() {
        let nv12 = frame(PixelFormat::Nv12, 2, 2, 0, vec![5, 6, 7, 8, 128, 128]);
        assert_eq!(to_luma(&nv12).unwrap().pixels, vec![5, 6, 7, 8]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let rgb = frame(PixelFormat::Rgb24, 4, 4, 0, vec![0; 10]);
        assert!(matches!(
            to_luma(&rgb),
            Err(ConvertError::Truncated { expected: 48, actual: 10 })
        ));
    }

    #[test]
    fn garbage_mjpeg_is_an_error() {
        let mjpeg = frame(PixelFormat::Mjpeg, 4, 4, 0, vec![1, 2, 3]);
        assert!(to_luma(&mjpeg).is_err());
    }

    #[test]
    fn empty_frames_are_rejected() {
        let luma = frame(PixelFormat::Luma8, 0, 4, 0, vec![]);
        assert!(matches!(to_luma(&luma), Err(ConvertError::Empty)));
    }
}
