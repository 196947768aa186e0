//! Badge payload construction
//!
//! Mint payloads are serialized JSON carried in the token URI, and the
//! ledger imposes a hard 256-byte ceiling. Instead of failing an
//! oversized mint, payloads shrink deterministically: optional fields are
//! dropped in a fixed order until the payload fits. The drop order is
//!
//! 1. `description`
//! 2. `title` / `name` truncated to 40 characters
//! 3. `icon`
//! 4. `date`
//!
//! The residual payload (type tag, identifiers, points) always fits.

use serde_json::{json, Value};

use crate::ledger::client::MAX_MINT_PAYLOAD_BYTES;

const TITLE_TRUNCATE_CHARS: usize = 40;

/// Payload for a mission-completion badge
pub fn mission_badge(
    mission_id: &str,
    title: &str,
    description: &str,
    earned_points: i64,
    tier: &str,
    date: &str,
) -> Vec<u8> {
    let full = json!({
        "type": "mission",
        "mission": mission_id,
        "title": title,
        "description": description,
        "points": earned_points,
        "tier": tier,
        "date": date,
    });
    bound_payload(full)
}

/// Payload for a citizen-level badge, deliberately minimal: it is minted
/// on every level-up and must stay far under the ceiling
pub fn level_badge(level_name: &str, icon: &str, points: i64, date: &str) -> Vec<u8> {
    let full = json!({
        "type": "level",
        "name": level_name,
        "icon": icon,
        "points": points,
        "date": date,
    });
    bound_payload(full)
}

/// Shrink a payload to the ledger ceiling following the documented
/// field-drop order
fn bound_payload(mut payload: Value) -> Vec<u8> {
    if fits(&payload) {
        return serialize(&payload);
    }

    // 1. description is the first to go
    if let Some(obj) = payload.as_object_mut() {
        obj.remove("description");
    }
    if fits(&payload) {
        return serialize(&payload);
    }

    // 2. truncate the display string
    if let Some(obj) = payload.as_object_mut() {
        for key in ["title", "name"] {
            if let Some(Value::String(s)) = obj.get_mut(key) {
                if s.chars().count() > TITLE_TRUNCATE_CHARS {
                    *s = s.chars().take(TITLE_TRUNCATE_CHARS).collect();
                }
            }
        }
    }
    if fits(&payload) {
        return serialize(&payload);
    }

    // 3. icon
    if let Some(obj) = payload.as_object_mut() {
        obj.remove("icon");
    }
    if fits(&payload) {
        return serialize(&payload);
    }

    // 4. date
    if let Some(obj) = payload.as_object_mut() {
        obj.remove("date");
    }
    serialize(&payload)
}

fn fits(payload: &Value) -> bool {
    serialize(payload).len() <= MAX_MINT_PAYLOAD_BYTES
}

fn serialize(payload: &Value) -> Vec<u8> {
    serde_json::to_vec(payload).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_is_untouched() {
        let bytes = mission_badge("m-1", "Park cleanup", "Pick up litter", 2, "Helper", "2026-08-30");
        assert!(bytes.len() <= MAX_MINT_PAYLOAD_BYTES);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["description"], "Pick up litter");
        assert_eq!(value["points"], 2);
    }

    #[test]
    fn long_description_is_dropped_first() {
        let description = "d".repeat(300);
        let bytes = mission_badge("m-1", "Park cleanup", &description, 2, "Helper", "2026-08-30");
        assert!(bytes.len() <= MAX_MINT_PAYLOAD_BYTES);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("description").is_none());
        // The title survives untruncated once the description is gone
        assert_eq!(value["title"], "Park cleanup");
    }

    #[test]
    fn extreme_payload_shrinks_to_minimal_form() {
        let title = "t".repeat(400);
        let description = "d".repeat(400);
        let bytes = mission_badge("m-1", &title, &description, 2, "Helper", "2026-08-30");
        assert!(bytes.len() <= MAX_MINT_PAYLOAD_BYTES);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("description").is_none());
        assert_eq!(value["title"].as_str().unwrap().chars().count(), 40);
        assert_eq!(value["mission"], "m-1");
    }

    #[test]
    fn level_badge_always_fits() {
        let bytes = level_badge("Champion", "🏆", 300, "2026-08-30");
        assert!(bytes.len() <= MAX_MINT_PAYLOAD_BYTES);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "level");
        assert_eq!(value["name"], "Champion");
    }
}
