//! Picking the human-readable answer out of a model's output.
//!
//! Hosted models disagree on where they put their answer, so each path names
//! the candidate keys it accepts in priority order.

use serde_json::Value;

/// Candidate keys for image captioning output.
pub const VISION_FIELDS: &[&str] = &["description", "response", "result"];

/// Candidate keys for text generation output.
pub const TEXT_FIELDS: &[&str] = &["response", "result", "output_text"];

/// Return the first present, non-null candidate field, or the raw output.
pub fn first_field(output: Value, fields: &[&str]) -> Value {
    let found = fields
        .iter()
        .find_map(|key| output.get(*key).filter(|v| !v.is_null()).cloned());
    found.unwrap_or(output)
}
