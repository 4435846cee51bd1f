//! QR decoding backed by rqrr

use std::time::Instant;

use rqrr::PreparedImage;
use tracing::{debug, trace, warn};

use super::{DecodeError, DecodedSymbol, Decoder, DecoderConfig, SymbolFormat};
use crate::capture::{to_luma, Frame, LumaImage};

/// Decoder for QR symbols.
///
/// rqrr finds grids at any orientation, so frame rotation needs no
/// correction here. Detection runs on the blocking pool.
pub struct QrDecoder {
    enabled: bool,
}

impl QrDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        let enabled = config.formats.contains(&SymbolFormat::Qr);
        if !enabled {
            debug!("QR not among the configured formats, decoder will report nothing");
        }
        let ignored = config.unsupported_by(&[SymbolFormat::Qr]);
        if !ignored.is_empty() {
            warn!(?ignored, "QR-only decoder cannot read some configured formats");
        }
        Self { enabled }
    }
}

impl Decoder for QrDecoder {
    async fn decode(&self, frame: &Frame) -> Result<Option<DecodedSymbol>, DecodeError> {
        if !self.enabled {
            return Ok(None);
        }

        let sequence = frame.sequence();
        let luma = to_luma(frame).map_err(|e| DecodeError::UnsupportedFrame(e.to_string()))?;

        let started = Instant::now();
        let content = tokio::task::spawn_blocking(move || first_grid(&luma))
            .await
            .map_err(|e| DecodeError::EngineUnavailable(e.to_string()))?;
        trace!(sequence, elapsed_us = started.elapsed().as_micros() as u64, "rqrr pass");

        Ok(content.map(|value| DecodedSymbol::new(value, SymbolFormat::Qr, sequence)))
    }
}

/// First grid, in rqrr's detection order, that decodes cleanly.
fn first_grid(luma: &LumaImage) -> Option<String> {
    let mut prepared =
        PreparedImage::prepare_from_greyscale(luma.width, luma.height, |x, y| luma.get(x, y));
    prepared
        .detect_grids()
        .iter()
        .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use qrcode::{Color, QrCode};

    use super::*;
    use crate::capture::{FrameMetadata, PixelFormat, Rotation};

    /// Render `payload` as a Luma8 frame, 4px per module with a quiet zone.
    fn qr_frame(payload: &str, sequence: u64) -> Frame {
        let code = QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        let colors = code.to_colors();
        let scale = 4;
        let quiet = 4;
        let side = (modules + 2 * quiet) * scale;

        let mut pixels = vec![255u8; side * side];
        for (i, color) in colors.iter().enumerate() {
            if *color != Color::Dark {
                continue;
            }
            let (mx, my) = (i % modules + quiet, i / modules + quiet);
            for y in my * scale..(my + 1) * scale {
                for x in mx * scale..(mx + 1) * scale {
                    pixels[y * side + x] = 0;
                }
            }
        }

        Frame::new(
            Bytes::from(pixels),
            FrameMetadata {
                sequence,
                width: side as u32,
                height: side as u32,
                stride: 0,
                format: PixelFormat::Luma8,
                rotation: Rotation::Deg0,
                device_timestamp: None,
            },
        )
    }

    #[tokio::test]
    async fn decodes_a_rendered_code() {
        let decoder = QrDecoder::new(&DecoderConfig::default());
        let symbol = decoder
            .decode(&qr_frame("https://example.com/a", 11))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(symbol.value(), "https://example.com/a");
        assert_eq!(symbol.format(), SymbolFormat::Qr);
        assert_eq!(symbol.source_frame_seq(), 11);
    }

    #[tokio::test]
    async fn blank_frame_has_no_symbol() {
        let frame = Frame::new(
            Bytes::from(vec![255u8; 64 * 64]),
            FrameMetadata {
                sequence: 1,
                width: 64,
                height: 64,
                stride: 0,
                format: PixelFormat::Luma8,
                rotation: Rotation::Deg0,
                device_timestamp: None,
            },
        );
        let decoder = QrDecoder::new(&DecoderConfig::default());
        assert_eq!(decoder.decode(&frame).await, Ok(None));
    }

    #[tokio::test]
    async fn disabled_format_reports_nothing() {
        let config = DecoderConfig {
            formats: vec![SymbolFormat::Ean13],
        };
        let decoder = QrDecoder::new(&config);
        assert_eq!(decoder.decode(&qr_frame("hidden", 1)).await, Ok(None));
    }

    #[tokio::test]
    async fn unreadable_frames_are_transient_errors() {
        let frame = Frame::new(
            Bytes::from_static(&[1, 2, 3]),
            FrameMetadata {
                sequence: 1,
                width: 8,
                height: 8,
                stride: 0,
                format: PixelFormat::Rgb24,
                rotation: Rotation::Deg0,
                device_timestamp: None,
            },
        );
        let decoder = QrDecoder::new(&DecoderConfig::default());
        assert!(matches!(
            decoder.decode(&frame).await,
            Err(DecodeError::UnsupportedFrame(_))
        ));
    }
}
