//! Multi-format decoding (QR, Aztec, PDF417 and linear codes) backed by rxing

use std::time::Instant;

use rxing::BarcodeFormat;
use tracing::{debug, trace};

use super::{DecodeError, DecodedSymbol, Decoder, DecoderConfig, SymbolFormat};
use crate::capture::{to_luma, Frame};

/// Decoder covering every [`SymbolFormat`].
///
/// Symbols of formats missing from the configuration are treated as absent.
pub struct BarcodeDecoder {
    formats: Vec<SymbolFormat>,
}

impl BarcodeDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        if config.formats.is_empty() {
            debug!("No symbol formats configured, decoder will report nothing");
        }
        Self {
            formats: config.formats.clone(),
        }
    }
}

impl Decoder for BarcodeDecoder {
    async fn decode(&self, frame: &Frame) -> Result<Option<DecodedSymbol>, DecodeError> {
        if self.formats.is_empty() {
            return Ok(None);
        }

        let sequence = frame.sequence();
        let luma = to_luma(frame).map_err(|e| DecodeError::UnsupportedFrame(e.to_string()))?;
        let (width, height) = (luma.width as u32, luma.height as u32);

        let started = Instant::now();
        let found = tokio::task::spawn_blocking(move || {
            // Nothing found and unreadable symbols both surface as errors
            rxing::helpers::detect_in_luma(luma.pixels, width, height, None).ok()
        })
        .await
        .map_err(|e| DecodeError::EngineUnavailable(e.to_string()))?;
        trace!(sequence, elapsed_us = started.elapsed().as_micros() as u64, "rxing pass");

        let Some(result) = found else {
            return Ok(None);
        };
        let Some(format) = symbol_format(result.getBarcodeFormat()) else {
            debug!(sequence, format = ?result.getBarcodeFormat(), "Ignoring unlisted symbology");
            return Ok(None);
        };
        if !self.formats.contains(&format) {
            trace!(sequence, %format, "Format not configured");
            return Ok(None);
        }

        Ok(Some(DecodedSymbol::new(result.getText(), format, sequence)))
    }
}

fn symbol_format(format: &BarcodeFormat) -> Option<SymbolFormat> {
    let format = match format {
        BarcodeFormat::QR_CODE => SymbolFormat::Qr,
        BarcodeFormat::AZTEC => SymbolFormat::Aztec,
        BarcodeFormat::CODE_128 => SymbolFormat::Code128,
        BarcodeFormat::CODE_39 => SymbolFormat::Code39,
        BarcodeFormat::CODE_93 => SymbolFormat::Code93,
        BarcodeFormat::EAN_8 => SymbolFormat::Ean8,
        BarcodeFormat::EAN_13 => SymbolFormat::Ean13,
        BarcodeFormat::UPC_A => SymbolFormat::UpcA,
        BarcodeFormat::UPC_E => SymbolFormat::UpcE,
        BarcodeFormat::PDF_417 => SymbolFormat::Pdf417,
        _ => return None,
    };
    Some(format)
}
