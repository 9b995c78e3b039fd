//! Settings loading: defaults, then a JSON file, then `THINGSYNC_*` env vars.
//!
//! Merge rules for the file layer:
//! - Objects merge recursively, file keys winning
//! - Arrays and primitives are replaced wholesale
//! - `null` in the file keeps the default

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{Settings, StoreBackend};

/// Load settings from `path` and apply env overrides.
///
/// A missing file yields defaults; an unreadable or invalid file is an error.
/// The result is validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let overlay: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, overlay)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` over `target`, recursing into objects.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut into), Value::Object(from)) => {
            for (key, value) in from {
                if value.is_null() {
                    continue;
                }
                let merged = match into.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = into.insert(key, merged);
            }
            Value::Object(into)
        }
        (_, source) => source,
    }
}

/// Apply `THINGSYNC_*` environment variables over `settings`.
///
/// Values that fail to parse or fall out of range are logged and ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with an injectable variable lookup.
pub fn apply_overrides_with<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("THINGSYNC_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("THINGSYNC_PORT", 0, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("THINGSYNC_MAX_SEND_QUEUE", 2, 1_000_000) {
        settings.server.max_send_queue = v;
    }
    if let Some(v) = env.u64("THINGSYNC_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("THINGSYNC_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }

    if let Some(v) = env.string("THINGSYNC_STORE_BACKEND") {
        match parse_backend(&v) {
            Some(backend) => settings.store.backend = backend,
            None => warn!(key = "THINGSYNC_STORE_BACKEND", value = %v, "unknown store backend, ignoring"),
        }
    }
    if let Some(v) = env.usize("THINGSYNC_STORE_CAPACITY", 1, 1_000_000) {
        settings.store.capacity = v;
    }
    if let Some(v) = env.string("THINGSYNC_SQLITE_PATH") {
        settings.store.sqlite_path = v.into();
    }

    if let Some(v) = env.u64("THINGSYNC_SESSION_LIFETIME_SECS", 1, 365 * 24 * 60 * 60) {
        settings.session.lifetime_secs = v;
    }
    if let Some(v) = env.bool("THINGSYNC_COOKIE_SECURE") {
        settings.session.cookie.secure = v;
    }

    if let Some(v) = env.bool("THINGSYNC_REPLY_ERRORS") {
        settings.hub.reply_errors = v;
    }

    if let Some(v) = env.string("THINGSYNC_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("THINGSYNC_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.string("THINGSYNC_LOG_FILE") {
        settings.logging.file = Some(v.into());
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitive.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_backend(val: &str) -> Option<StoreBackend> {
    match val.to_ascii_lowercase().as_str() {
        "memory" | "mem" => Some(StoreBackend::Memory),
        "sqlite" => Some(StoreBackend::Sqlite),
        _ => None,
    }
}

/// Parse an integer and keep it only if it lies in `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let parsed = parse_bool(&val);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        parsed
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = (self.lookup)(name)?;
        let parsed = parse_in_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        parsed
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.ranged(name, min, max)
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.ranged(name, min, max)
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.ranged(name, min, max)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::errors::SettingsError;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_keeps_siblings() {
        let merged = deep_merge(
            json!({"server": {"port": 9001, "host": "0.0.0.0"}}),
            json!({"server": {"port": 8081}}),
        );
        assert_eq!(merged["server"]["port"], 8081);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_replaces_arrays() {
        let merged = deep_merge(json!({"seed": ["a", "b", "c"]}), json!({"seed": []}));
        assert_eq!(merged["seed"], json!([]));
    }

    #[test]
    fn merge_skips_null() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null, "b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_scalar_over_object() {
        let merged = deep_merge(json!({"a": {"b": true}}), json!({"a": 3}));
        assert_eq!(merged["a"], 3);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/thingsync.json")).unwrap();
        assert_eq!(settings.store.capacity, Settings::default().store.capacity);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thingsync.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 8081}, "store": {"backend": "sqlite", "seed": ["Only"]}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.store.seed, vec!["Only"]);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thingsync.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thingsync.json");
        std::fs::write(&path, r#"{"store": {"capacity": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn overrides_apply_parsed_values() {
        let mut settings = Settings::default();
        apply_overrides_with(
            &mut settings,
            vars(&[
                ("THINGSYNC_PORT", "8081"),
                ("THINGSYNC_STORE_BACKEND", "SQLite"),
                ("THINGSYNC_STORE_CAPACITY", "40"),
                ("THINGSYNC_REPLY_ERRORS", "yes"),
                ("THINGSYNC_LOG_JSON", "1"),
                ("THINGSYNC_SQLITE_PATH", "/tmp/things.db"),
            ]),
        );
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.store.capacity, 40);
        assert!(settings.hub.reply_errors);
        assert!(settings.logging.json);
        assert_eq!(settings.store.sqlite_path, Path::new("/tmp/things.db"));
    }

    #[test]
    fn bad_override_values_are_ignored() {
        let mut settings = Settings::default();
        apply_overrides_with(
            &mut settings,
            vars(&[
                ("THINGSYNC_PORT", "99999"),
                ("THINGSYNC_STORE_CAPACITY", "0"),
                ("THINGSYNC_STORE_BACKEND", "postgres"),
                ("THINGSYNC_REPLY_ERRORS", "maybe"),
                ("THINGSYNC_HOST", ""),
            ]),
        );
        let defaults = Settings::default();
        assert_eq!(settings.server.port, defaults.server.port);
        assert_eq!(settings.store.capacity, defaults.store.capacity);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert!(!settings.hub.reply_errors);
        assert_eq!(settings.server.host, defaults.server.host);
    }

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "YES", "on"] {
            assert_eq!(parse_bool(val), Some(true), "{val}");
        }
        for val in ["false", "0", "No", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "{val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range("25", 1usize, 100), Some(25));
        assert_eq!(parse_in_range("1", 1u64, 10), Some(1));
        assert_eq!(parse_in_range("11", 1u64, 10), None);
        assert_eq!(parse_in_range::<u16>("70000", 0, u16::MAX), None);
        assert_eq!(parse_in_range::<u16>("abc", 0, u16::MAX), None);
    }
}
