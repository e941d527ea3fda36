/// User settings
///
/// Each setting carries its kind (with the constraints for that kind) and a
/// current value. Settings are saved as a JSON list of `[key, value]` pairs.
use crate::error::{Error, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingKind {
    Bool,
    Number { min: f64, max: f64 },
    String { min_length: usize, max_length: usize },
    SingleValue { allowed: Vec<&'static str> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: SettingKind,
    pub default: SettingValue,
    value: SettingValue,
}

impl Setting {
    fn new(name: &'static str, description: &'static str, kind: SettingKind, default: SettingValue) -> Self {
        Setting {
            name,
            description,
            kind,
            value: default.clone(),
            default,
        }
    }

    fn bool(name: &'static str, description: &'static str, default: bool) -> Self {
        Setting::new(name, description, SettingKind::Bool, SettingValue::Bool(default))
    }

    pub fn value(&self) -> &SettingValue {
        &self.value
    }

    /// Why `value` is not acceptable for this setting, if it is not
    pub fn check(&self, value: &SettingValue) -> std::result::Result<(), String> {
        match (&self.kind, value) {
            (SettingKind::Bool, SettingValue::Bool(_)) => Ok(()),
            (SettingKind::Number { min, .. }, SettingValue::Number(n)) if n < min => {
                Err(format!("must be more or equal to {min}, not {n}"))
            }
            (SettingKind::Number { max, .. }, SettingValue::Number(n)) if n > max => {
                Err(format!("must be less or equal to {max}, not {n}"))
            }
            (SettingKind::Number { .. }, SettingValue::Number(n)) if n.is_nan() => {
                Err("must be a number".to_string())
            }
            (SettingKind::Number { .. }, SettingValue::Number(_)) => Ok(()),
            (SettingKind::String { min_length, max_length }, SettingValue::Text(s)) => {
                let len = s.chars().count();
                if len < *min_length || len > *max_length {
                    Err(format!("length must be between {min_length} and {max_length}, not {len}"))
                } else {
                    Ok(())
                }
            }
            (SettingKind::SingleValue { allowed }, SettingValue::Text(s)) => {
                if allowed.iter().any(|a| *a == s.as_str()) {
                    Ok(())
                } else {
                    Err(format!("must be one of [{}], not {s}", allowed.join(", ")))
                }
            }
            (kind, value) => Err(format!("{value:?} does not fit a {kind:?} setting")),
        }
    }

    pub fn set(&mut self, value: SettingValue) -> Result<()> {
        self.check(&value).map_err(|reason| Error::Setting {
            name: self.name.to_string(),
            reason,
        })?;
        self.value = value;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
    }
}

pub const CLOSE_WHEN_SENDING: &str = "closeWhenSendingViaAction";
pub const LOG_LEVEL: &str = "logLevel";
pub const FETCH_UNDEFINED_FAVICONS: &str = "fetchUndefinedFavicons";
pub const CACHE_FAVICONS: &str = "cacheFavicons";
pub const FAVICONS_CLEANUP_FREQUENCY: &str = "faviconsCleanupFrequency";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    entries: Vec<(&'static str, Setting)>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            entries: vec![
                (
                    CLOSE_WHEN_SENDING,
                    Setting::bool(
                        "Close tabs when sending via the toolbar button",
                        "If true, tabs sent with the toolbar button are closed once saved",
                        true,
                    ),
                ),
                (
                    LOG_LEVEL,
                    Setting::new(
                        "Log level",
                        "Level at which the logger works",
                        SettingKind::SingleValue {
                            allowed: vec!["DEBUG", "INFO", "WARN", "ERROR"],
                        },
                        SettingValue::Text("INFO".to_string()),
                    ),
                ),
                (
                    FETCH_UNDEFINED_FAVICONS,
                    Setting::bool(
                        "Fetch undefined favicons",
                        "If true, tabs without a favicon get the site's /favicon.ico",
                        true,
                    ),
                ),
                (
                    CACHE_FAVICONS,
                    Setting::bool("Cache favicons", "If true, favicons are kept in memory", true),
                ),
                (
                    FAVICONS_CLEANUP_FREQUENCY,
                    Setting::new(
                        "Favicons cleanup frequency",
                        "Hours between removals of favicons no tab uses",
                        SettingKind::Number {
                            min: 1.0,
                            max: f64::INFINITY,
                        },
                        SettingValue::Number(24.0),
                    ),
                ),
            ],
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Settings with saved values applied. Unknown keys and rejected values
    /// are skipped so an old save never blocks startup.
    pub fn from_json(json: &str) -> Result<Self> {
        let saved: Vec<(String, SettingValue)> = serde_json::from_str(json)?;
        let mut settings = Settings::default();
        for (key, value) in saved {
            match settings.get_mut(&key) {
                Some(setting) => {
                    if let Err(e) = setting.set(value) {
                        log::warn!("Ignoring saved setting: {}", e);
                    }
                }
                None => log::debug!("Ignoring unknown setting {}", key),
            }
        }
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        let pairs: Vec<(&str, &SettingValue)> = self.entries.iter().map(|(k, s)| (*k, s.value())).collect();
        Ok(serde_json::to_string(&pairs)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Setting)> {
        self.entries.iter().map(|(k, s)| (*k, s))
    }

    pub fn get(&self, key: &str) -> Option<&Setting> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, s)| s)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Setting> {
        self.entries.iter_mut().find(|(k, _)| *k == key).map(|(_, s)| s)
    }

    pub fn set(&mut self, key: &str, value: SettingValue) -> Result<()> {
        match self.get_mut(key) {
            Some(setting) => setting.set(value),
            None => Err(Error::Setting {
                name: key.to_string(),
                reason: "unknown setting".to_string(),
            }),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(|s| s.value().as_bool()).unwrap_or(false)
    }

    pub fn close_when_sending(&self) -> bool {
        self.flag(CLOSE_WHEN_SENDING)
    }

    pub fn fetch_undefined_favicons(&self) -> bool {
        self.flag(FETCH_UNDEFINED_FAVICONS)
    }

    pub fn cache_favicons(&self) -> bool {
        self.flag(CACHE_FAVICONS)
    }

    pub fn favicons_cleanup_hours(&self) -> f64 {
        self.get(FAVICONS_CLEANUP_FREQUENCY)
            .and_then(|s| s.value().as_number())
            .unwrap_or(24.0)
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.get(LOG_LEVEL).and_then(|s| s.value().as_text()) {
            Some("DEBUG") => LevelFilter::Debug,
            Some("WARN") => LevelFilter::Warn,
            Some("ERROR") => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new();

        assert!(settings.close_when_sending());
        assert!(settings.fetch_undefined_favicons());
        assert!(settings.cache_favicons());
        assert_eq!(settings.favicons_cleanup_hours(), 24.0);
        assert_eq!(settings.log_level(), LevelFilter::Info);
    }

    #[test]
    fn test_number_bounds() {
        let mut settings = Settings::new();

        let err = settings
            .set(FAVICONS_CLEANUP_FREQUENCY, SettingValue::Number(0.5))
            .unwrap_err();
        assert!(matches!(err, Error::Setting { .. }));
        assert_eq!(settings.favicons_cleanup_hours(), 24.0);

        settings.set(FAVICONS_CLEANUP_FREQUENCY, SettingValue::Number(6.0)).unwrap();
        assert_eq!(settings.favicons_cleanup_hours(), 6.0);
    }

    #[test]
    fn test_single_value_must_be_listed() {
        let mut settings = Settings::new();

        assert!(settings.set(LOG_LEVEL, SettingValue::Text("TRACE".to_string())).is_err());
        settings.set(LOG_LEVEL, SettingValue::Text("WARN".to_string())).unwrap();
        assert_eq!(settings.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut settings = Settings::new();

        assert!(settings.set(CLOSE_WHEN_SENDING, SettingValue::Number(1.0)).is_err());
        assert!(settings.set("noSuchSetting", SettingValue::Bool(true)).is_err());
    }

    #[test]
    fn test_string_length() {
        let mut setting = Setting::new(
            "Name",
            "",
            SettingKind::String {
                min_length: 1,
                max_length: 3,
            },
            SettingValue::Text("a".to_string()),
        );

        assert!(setting.set(SettingValue::Text(String::new())).is_err());
        assert!(setting.set(SettingValue::Text("abcd".to_string())).is_err());
        setting.set(SettingValue::Text("abc".to_string())).unwrap();
        setting.reset();
        assert_eq!(setting.value(), &SettingValue::Text("a".to_string()));
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = Settings::new();
        settings.set(CLOSE_WHEN_SENDING, SettingValue::Bool(false)).unwrap();
        settings.set(LOG_LEVEL, SettingValue::Text("DEBUG".to_string())).unwrap();

        let json = settings.to_json().unwrap();
        assert!(json.contains("[\"closeWhenSendingViaAction\",false]"));

        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_load_skips_unknown_and_invalid() {
        let json = r#"[["profilerEnabled",true],["faviconsCleanupFrequency",0],["cacheFavicons",false]]"#;
        let settings = Settings::from_json(json).unwrap();

        assert!(!settings.cache_favicons());
        assert_eq!(settings.favicons_cleanup_hours(), 24.0);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        assert!(matches!(Settings::from_json("{"), Err(Error::Import(_))));
    }
}
