//! Metadata payload normalization.
//!
//! Raw bytes from the listener become either a canonical `DetectionRecord`
//! or an explicit decode-error event. Nothing escapes this boundary as an
//! `Err`: a worker sending garbage must not be able to take the listener
//! down, and the operator should see the failure rather than silence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized per-message inference result.
///
/// All three fields are always present after decoding, regardless of what
/// the source payload contained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Bounding boxes as `[x1, y1, x2, y2]` in the caller-defined
    /// coordinate space of the worker.
    pub boxes: Vec<[f32; 4]>,
    pub confidence: f32,
    pub label: String,
}

impl Default for DetectionRecord {
    fn default() -> Self {
        Self {
            boxes: Vec::new(),
            confidence: 0.0,
            label: "unknown".to_string(),
        }
    }
}

impl DetectionRecord {
    /// Single-line rendering for the metadata history panel.
    pub fn display_line(&self) -> String {
        format!(
            "label={} confidence={:.2} boxes={}",
            self.label,
            self.confidence,
            self.boxes.len()
        )
    }
}

/// Outcome of decoding one metadata payload.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataEvent {
    Record(DetectionRecord),
    /// The payload was not valid JSON. Carries a short reason for display.
    DecodeError(String),
}

/// Decode one raw payload chunk into a metadata event.
///
/// Shape handling:
/// - JSON array: element 0 is used, the rest discarded; an empty array
///   yields the all-default record.
/// - JSON object: used directly.
/// - Any other JSON value: all-default record.
/// - Non-JSON bytes: `MetadataEvent::DecodeError`.
///
/// Missing or wrongly-typed keys fall back to their defaults rather than
/// failing the whole document.
pub fn decode_payload(raw: &[u8]) -> MetadataEvent {
    let value: Value = match serde_json::from_slice(raw) {
        Ok(value) => value,
        Err(err) => return MetadataEvent::DecodeError(format!("invalid JSON: {err}")),
    };

    let object = match value {
        Value::Array(items) => items.into_iter().next(),
        other @ Value::Object(_) => Some(other),
        _ => None,
    };

    let record = match object {
        Some(Value::Object(map)) => DetectionRecord {
            boxes: map.get("boxes").map(parse_boxes).unwrap_or_default(),
            confidence: map
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32,
            label: map
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        },
        // Array whose first element is not an object, or a scalar document.
        _ => DetectionRecord::default(),
    };

    MetadataEvent::Record(record)
}

fn parse_boxes(value: &Value) -> Vec<[f32; 4]> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|entry| {
            let coords = entry.as_array()?;
            if coords.len() != 4 {
                return None;
            }
            let mut out = [0f32; 4];
            for (slot, coord) in out.iter_mut().zip(coords) {
                *slot = coord.as_f64()? as f32;
            }
            Some(out)
        })
        .collect()
}
