use std::future::Future;

use thiserror::Error;

use super::DecodedSymbol;
use crate::capture::Frame;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The decoding engine could not be reached, e.g. its model is not ready.
    #[error("decoding engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("frame cannot be decoded: {0}")]
    UnsupportedFrame(String),
}

/// Symbol decoding engine.
///
/// Returns `Ok(None)` when the frame holds no symbol. When several symbols
/// are visible, the first one in the engine's own order is returned; which
/// one that is may differ between engines.
pub trait Decoder: Send + Sync + 'static {
    fn decode(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Option<DecodedSymbol>, DecodeError>> + Send;
}
