//! Symbol decoding: the engine contract and its adapters

#[cfg(feature = "barcode")]
pub mod barcode;
pub mod decoder;
#[cfg(feature = "qr")]
pub mod qr;
pub mod symbol;

use serde::{Deserialize, Serialize};

#[cfg(feature = "barcode")]
pub use barcode::BarcodeDecoder;
pub use decoder::{DecodeError, Decoder};
#[cfg(feature = "qr")]
pub use qr::QrDecoder;
pub use symbol::{DecodedSymbol, SymbolFormat};

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Symbologies to report; anything else is treated as "no symbol"
    pub formats: Vec<SymbolFormat>,
}

impl DecoderConfig {
    /// Configured formats an engine limited to `supported` cannot decode.
    pub fn unsupported_by(&self, supported: &[SymbolFormat]) -> Vec<SymbolFormat> {
        self.formats
            .iter()
            .copied()
            .filter(|format| !supported.contains(format))
            .collect()
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            formats: SymbolFormat::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_formats_outside_an_engine() {
        let config = DecoderConfig {
            formats: vec![SymbolFormat::Qr, SymbolFormat::Ean13, SymbolFormat::UpcA],
        };
        assert_eq!(
            config.unsupported_by(&[SymbolFormat::Qr]),
            vec![SymbolFormat::Ean13, SymbolFormat::UpcA]
        );
        assert!(config.unsupported_by(&SymbolFormat::ALL).is_empty());
    }
}
