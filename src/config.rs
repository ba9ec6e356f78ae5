use std::env;
use serde::Deserialize;

pub(crate) const CONFIG_FILE: &str = "otp-migration.json";
const DEFAULT_DB_PATH: &str = "otp-migration.db";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub(crate) db_path: String,
    pub(crate) show_secrets: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            show_secrets: false,
        }
    }
}

impl Settings {
    fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            db_path: lookup("OTP_MIGRATION_DB").unwrap_or(defaults.db_path),
            show_secrets: lookup("OTP_MIGRATION_SHOW_SECRETS")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.show_secrets),
        }
    }
}

pub fn load_settings() -> Settings {
    // Read the config file, and if it doesn't exist, use env vars.
    if let Ok(file_content) = std::fs::read_to_string(CONFIG_FILE) {
        match Settings::from_json(&file_content) {
            Ok(settings) => return settings,
            Err(e) => tracing::warn!(error = %e, "ignoring malformed {}", CONFIG_FILE),
        }
    }

    Settings::from_lookup(|key| env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let settings = Settings::from_json(r#"{"show_secrets": true}"#).unwrap();
        assert_eq!(settings.db_path, DEFAULT_DB_PATH);
        assert!(settings.show_secrets);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Settings::from_json("{db_path:").is_err());
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let settings = Settings::from_lookup(|key| match key {
            "OTP_MIGRATION_DB" => Some("/tmp/vault.db".to_string()),
            "OTP_MIGRATION_SHOW_SECRETS" => Some("TRUE".to_string()),
            _ => None,
        });
        assert_eq!(settings.db_path, "/tmp/vault.db");
        assert!(settings.show_secrets);

        assert_eq!(Settings::from_lookup(|_| None), Settings::default());
    }
}
