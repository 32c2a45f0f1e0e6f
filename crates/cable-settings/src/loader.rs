//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CableSettings::default()`]
//! 2. If a config file is given and exists, deep-merge its values over defaults
//! 3. Apply `CABLE_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{CableSettings, LogFormat};

/// Load settings from an optional file path with env var overrides.
pub fn load_settings(path: Option<&Path>) -> Result<CableSettings> {
    let mut settings = match path {
        Some(path) => load_settings_from_path(path)?,
        None => CableSettings::default(),
    };
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

/// Load settings from a file without touching the environment.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CableSettings> {
    let defaults = serde_json::to_value(CableSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CABLE_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored, keeping the file/default value.
pub fn apply_env_overrides(settings: &mut CableSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("CABLE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.ranged("CABLE_PORT", 0u16, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("CABLE_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.ranged("CABLE_SEND_QUEUE", 1usize, 65_536) {
        settings.server.send_queue = v;
    }
    if let Some(v) = env.ranged("CABLE_RECEIVE_QUEUE", 1usize, 65_536) {
        settings.server.receive_queue = v;
    }
    if let Some(v) = env.bool("CABLE_HEARTBEAT_ENABLED") {
        settings.heartbeat.enabled = v;
    }
    if let Some(v) = env.ranged("CABLE_HEARTBEAT_INTERVAL", 1u64, 3_600) {
        settings.heartbeat.interval_secs = v;
    }
    if let Some(v) = env.ranged("CABLE_BUS_INBOX", 1usize, 1_048_576) {
        settings.bus.inbox_capacity = v;
    }
    if let Some(v) = env.string("CABLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CABLE_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "CABLE_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &CableSettings) -> Result<()> {
    if !settings.server.path.starts_with('/') {
        return Err(SettingsError::InvalidValue(format!(
            "server.path must start with '/': {}",
            settings.server.path
        )));
    }
    if settings.server.path == "/health" || settings.server.path.starts_with("/broadcast") {
        return Err(SettingsError::InvalidValue(format!(
            "server.path collides with a built-in route: {}",
            settings.server.path
        )));
    }
    if settings.server.send_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueue must be at least 1".into(),
        ));
    }
    if settings.server.receive_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "server.receiveQueue must be at least 1".into(),
        ));
    }
    if settings.bus.inbox_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "bus.inboxCapacity must be at least 1".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `json` / `pretty` (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" | "text" => Some(LogFormat::Pretty),
        _ => None,
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn deep_merge_objects_recursively() {
        let target = json!({"server": {"host": "a", "port": 1}, "x": 1});
        let source = json!({"server": {"port": 2}});
        assert_eq!(
            deep_merge(target, source),
            json!({"server": {"host": "a", "port": 2}, "x": 1})
        );
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let merged = deep_merge(json!({"a": [1, 2]}), json!({"a": [3]}));
        assert_eq!(merged, json!({"a": [3]}));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, CableSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server":{{"port":7000}},"heartbeat":{{"enabled":false}}}}"#).unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert!(!settings.heartbeat.enabled);
        assert_eq!(settings.heartbeat.interval_secs, 5);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = CableSettings::default();
        apply_env_overrides(
            &mut settings,
            env_of(&[
                ("CABLE_HOST", "0.0.0.0"),
                ("CABLE_PORT", "8080"),
                ("CABLE_PATH", "/ws"),
                ("CABLE_HEARTBEAT_ENABLED", "off"),
                ("CABLE_HEARTBEAT_INTERVAL", "10"),
                ("CABLE_SEND_QUEUE", "32"),
                ("CABLE_RECEIVE_QUEUE", "8"),
                ("CABLE_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(settings.server.send_queue, 32);
        assert_eq!(settings.server.receive_queue, 8);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.path, "/ws");
        assert!(!settings.heartbeat.enabled);
        assert_eq!(settings.heartbeat.interval_secs, 10);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = CableSettings::default();
        apply_env_overrides(
            &mut settings,
            env_of(&[
                ("CABLE_PORT", "not-a-port"),
                ("CABLE_HEARTBEAT_INTERVAL", "0"),
                ("CABLE_HEARTBEAT_ENABLED", "maybe"),
                ("CABLE_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(settings, CableSettings::default());
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut settings = CableSettings::default();
        apply_env_overrides(&mut settings, env_of(&[("CABLE_HOST", "")]));
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn validate_rejects_relative_path() {
        let mut settings = CableSettings::default();
        settings.server.path = "cable".into();
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn validate_rejects_reserved_paths() {
        for path in ["/health", "/broadcast/x"] {
            let mut settings = CableSettings::default();
            settings.server.path = path.into();
            assert!(validate(&settings).is_err(), "{path} accepted");
        }
    }

    #[test]
    fn validate_rejects_empty_queues() {
        let mut settings = CableSettings::default();
        settings.server.receive_queue = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&CableSettings::default()).is_ok());
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
        assert_eq!(parse_range("42", 1u16, 100), Some(42));
        assert_eq!(parse_range("101", 1u16, 100), None);
        assert_eq!(parse_range::<u64>("-1", 0, 10), None);
        assert_eq!(parse_log_format("pretty"), Some(LogFormat::Pretty));
    }
}
