//! Shared timestamp/id helpers for journal entries, leases and envelopes.

use serde_json::Value as JsonValue;
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

/// Seconds since the unix epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Formats epoch seconds with a `Z` suffix (e.g. `1771220592Z`).
pub fn epoch_z(secs: u64) -> String {
    format!("{}Z", secs)
}

/// Returns unix-epoch seconds with `Z` suffix for the current instant.
pub fn now_epoch_z() -> String {
    epoch_z(now_secs())
}

/// Parses a value produced by [`epoch_z`]. Surrounding quotes and whitespace
/// are tolerated; anything else yields `None`.
pub fn parse_epoch_z(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_matches('"').trim_matches('\'');
    trimmed.strip_suffix('Z')?.parse::<u64>().ok()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope used by `--json` CLI output.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_epoch_z_format() {
        let result = now_epoch_z();
        assert!(result.ends_with('Z'));
        let numeric_part = result.trim_end_matches('Z');
        assert!(numeric_part.parse::<u64>().is_ok());
    }

    #[test]
    fn test_parse_epoch_z_accepts_quoted() {
        assert_eq!(parse_epoch_z("\"1771220592Z\""), Some(1771220592));
        assert_eq!(parse_epoch_z("1771220592Z"), Some(1771220592));
        assert_eq!(parse_epoch_z("2026-02-09T10:15:38+00:00"), None);
        assert_eq!(parse_epoch_z(""), None);
    }

    #[test]
    fn test_new_event_id_is_valid_ulid() {
        let id = new_event_id();
        assert!(ulid::Ulid::from_string(&id).is_ok());
        assert_ne!(id, new_event_id());
    }

    #[test]
    fn test_command_envelope_with_extra() {
        let extra = serde_json::json!({"key": "value", "count": 42});
        let envelope = command_envelope("test", "ok", extra);
        assert_eq!(envelope["cmd"], "test");
        assert_eq!(envelope["status"], "ok");
        assert_eq!(envelope["key"], "value");
        assert_eq!(envelope["count"], 42);
        assert_eq!(envelope["envelope_version"], "1.0.0");
    }
}
