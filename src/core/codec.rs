//! Textual form of a stored descriptor. The current format is a plain JSON
//! array; a `{"version": 1, "values": [...]}` envelope is accepted on read so
//! the format can grow without breaking stored records.

use crate::common::{FaceBankError, Result};
use crate::core::extractor::Descriptor;
use serde::Deserialize;

const ENVELOPE_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    values: Vec<f64>,
}

pub fn encode(descriptor: &[f64]) -> Result<String> {
    serde_json::to_string(descriptor)
        .map_err(|e| FaceBankError::Storage(format!("Failed to encode descriptor: {}", e)))
}

/// Empty text means "never enrolled" and decodes to None. Text that is
/// present but unreadable is corruption, not an expected state.
pub fn decode(text: &str) -> Result<Option<Descriptor>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if trimmed.starts_with('{') {
        let envelope: Envelope = serde_json::from_str(trimmed)
            .map_err(|e| FaceBankError::CorruptDescriptor(e.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(FaceBankError::CorruptDescriptor(format!(
                "unsupported descriptor version {}",
                envelope.version
            )));
        }
        return Ok(Some(envelope.values));
    }

    let values: Vec<f64> = serde_json::from_str(trimmed)
        .map_err(|e| FaceBankError::CorruptDescriptor(e.to_string()))?;
    Ok(Some(values))
}
