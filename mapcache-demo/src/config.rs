//! Demo settings: TOML file plus environment overrides.

use std::path::PathBuf;

use mapcache_core::{CacheSettings, ConfigError, EMPLOYEE_NAMESPACE};
use mapcache_storage::employee_namespace_settings;

/// Settings source read from the environment.
#[derive(Debug, Clone, Default)]
pub struct DemoConfig {
    /// `MAPCACHE_CONFIG`: TOML settings file.
    pub settings_path: Option<PathBuf>,
    /// `MAPCACHE_CACHE_ENABLED`: overrides `cache_enabled`.
    pub cache_enabled: Option<bool>,
}

impl DemoConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cache_enabled = match std::env::var("MAPCACHE_CACHE_ENABLED") {
            Ok(value) => Some(parse_bool("MAPCACHE_CACHE_ENABLED", &value)?),
            Err(_) => None,
        };
        Ok(Self {
            settings_path: std::env::var("MAPCACHE_CONFIG").ok().map(PathBuf::from),
            cache_enabled,
        })
    }

    /// Load and validate cache settings.
    ///
    /// Without a settings file the Employee statements are registered with
    /// their defaults. A file that leaves the Employee namespace out gets it
    /// added the same way.
    pub fn load_settings(&self) -> Result<CacheSettings, ConfigError> {
        let mut settings = match &self.settings_path {
            Some(path) => CacheSettings::from_file(path)?,
            None => CacheSettings::default(),
        };
        if !settings.namespaces.contains_key(EMPLOYEE_NAMESPACE) {
            settings = settings.with_namespace(EMPLOYEE_NAMESPACE, employee_namespace_settings());
        }
        if let Some(enabled) = self.cache_enabled {
            settings = settings.with_cache_enabled(enabled);
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_register_employee() {
        let settings = DemoConfig::default().load_settings().unwrap();
        assert!(settings.cache_enabled);
        assert!(settings.statement(EMPLOYEE_NAMESPACE, "getEmpById").is_ok());
    }

    #[test]
    fn test_cache_enabled_override() {
        let config = DemoConfig {
            settings_path: None,
            cache_enabled: Some(false),
        };
        assert!(!config.load_settings().unwrap().cache_enabled);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let config = DemoConfig {
            settings_path: Some(PathBuf::from("/nonexistent/mapcache.toml")),
            cache_enabled: None,
        };
        assert!(matches!(config.load_settings(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_bundled_settings_file_parses() {
        let config = DemoConfig {
            settings_path: Some(PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/mapcache.toml"))),
            cache_enabled: None,
        };
        let settings = config.load_settings().unwrap();
        assert!(settings.statement(EMPLOYEE_NAMESPACE, "deleteEmpById").is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("x", "TRUE").unwrap());
        assert!(!parse_bool("x", " off ").unwrap());
        assert!(matches!(
            parse_bool("x", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
