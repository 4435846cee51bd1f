//! Turns raw decode results into deduplicated "new value" events

use std::collections::HashSet;

use crate::scan::DecodedSymbol;

/// Dedup state for one start/stop lifetime of the pipeline.
#[derive(Debug, Default)]
pub struct ScanSession {
    generation: u64,
    last_emitted_value: Option<String>,
    emitted: HashSet<String>,
}

impl ScanSession {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Default::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_emitted_value(&self) -> Option<&str> {
        self.last_emitted_value.as_deref()
    }
}

/// Returns the value to report, if this result carries a value not yet
/// emitted in `session`.
///
/// Values never expire: a code that leaves the frame and comes back later
/// stays silent until a new session starts.
pub fn on_decoded(symbol: Option<DecodedSymbol>, session: &mut ScanSession) -> Option<String> {
    let value = symbol?.into_value();
    if value.is_empty() || session.last_emitted_value.as_deref() == Some(value.as_str()) {
        return None;
    }
    if !session.emitted.insert(value.clone()) {
        return None;
    }

    session.last_emitted_value = Some(value.clone());
    Some(value)
}
