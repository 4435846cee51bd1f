use std::fmt;

use serde::{Deserialize, Serialize};

/// Symbologies the decoder can be asked to recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolFormat {
    Qr,
    Aztec,
    Code128,
    Code39,
    Code93,
    Ean8,
    Ean13,
    UpcA,
    UpcE,
    Pdf417,
}

impl SymbolFormat {
    pub const ALL: [SymbolFormat; 10] = [
        SymbolFormat::Qr,
        SymbolFormat::Aztec,
        SymbolFormat::Code128,
        SymbolFormat::Code39,
        SymbolFormat::Code93,
        SymbolFormat::Ean8,
        SymbolFormat::Ean13,
        SymbolFormat::UpcA,
        SymbolFormat::UpcE,
        SymbolFormat::Pdf417,
    ];

    pub fn is_linear(self) -> bool {
        !matches!(self, SymbolFormat::Qr | SymbolFormat::Aztec | SymbolFormat::Pdf417)
    }
}

impl fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolFormat::Qr => "QR",
            SymbolFormat::Aztec => "AZTEC",
            SymbolFormat::Code128 => "CODE128",
            SymbolFormat::Code39 => "CODE39",
            SymbolFormat::Code93 => "CODE93",
            SymbolFormat::Ean8 => "EAN8",
            SymbolFormat::Ean13 => "EAN13",
            SymbolFormat::UpcA => "UPC_A",
            SymbolFormat::UpcE => "UPC_E",
            SymbolFormat::Pdf417 => "PDF417",
        };
        f.write_str(name)
    }
}

/// One symbol extracted from a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSymbol {
    value: String,
    format: SymbolFormat,
    source_frame_seq: u64,
}

impl DecodedSymbol {
    pub fn new(value: impl Into<String>, format: SymbolFormat, source_frame_seq: u64) -> Self {
        Self {
            value: value.into(),
            format,
            source_frame_seq,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn format(&self) -> SymbolFormat {
        self.format
    }

    pub fn source_frame_seq(&self) -> u64 {
        self.source_frame_seq
    }

    pub fn into_value(self) -> String {
        self.value
    }
}
