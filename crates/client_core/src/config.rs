use std::{collections::HashMap, fs};

use storage::LocalStore;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "workshop.toml";
pub const DEFAULT_IMAGE_LIST_LIMIT: usize = 20;
const FALLBACK_LOCAL_STORE_URL: &str = "sqlite://./data/workshop_client.sqlite3";
const DATA_DIR_NAME: &str = "workshop-vote";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub local_store_url: String,
    pub image_list_limit: usize,
    pub realtime_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: None,
            anon_key: None,
            local_store_url: default_local_store_url(),
            image_list_limit: DEFAULT_IMAGE_LIST_LIMIT,
            realtime_enabled: true,
        }
    }
}

/// Validated connection details for the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCredentials {
    pub url: Url,
    pub anon_key: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing backend url (set SUPABASE_URL or backend_url in {SETTINGS_FILE})")]
    MissingBackendUrl,
    #[error("missing backend anon key (set SUPABASE_ANON_KEY or anon_key in {SETTINGS_FILE})")]
    MissingAnonKey,
    #[error("invalid backend url '{url}': {source}")]
    InvalidBackendUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("backend url must use http or https, got '{0}'")]
    UnsupportedScheme(String),
}

impl Settings {
    pub fn backend(&self) -> Result<BackendCredentials, ConfigError> {
        let raw_url = self
            .backend_url
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingBackendUrl)?;
        let anon_key = self
            .anon_key
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingAnonKey)?;

        let url = Url::parse(raw_url).map_err(|source| ConfigError::InvalidBackendUrl {
            url: raw_url.to_string(),
            source,
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        Ok(BackendCredentials {
            url,
            anon_key: anon_key.to_string(),
        })
    }
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the flat settings file, then environment overrides (last one wins).
pub fn load_settings_from(
    settings_file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = settings_file {
        match toml::from_str::<HashMap<String, toml::Value>>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_value(&file_cfg, "backend_url") {
                    settings.backend_url = Some(v);
                }
                if let Some(v) = file_value(&file_cfg, "anon_key") {
                    settings.anon_key = Some(v);
                }
                if let Some(v) = file_value(&file_cfg, "local_store_url") {
                    settings.local_store_url = normalize_local_store_url(&v);
                }
                if let Some(v) = file_value(&file_cfg, "image_list_limit") {
                    apply_image_list_limit(&mut settings, &v);
                }
                if let Some(v) = file_value(&file_cfg, "realtime") {
                    apply_realtime_flag(&mut settings, &v);
                }
            }
            Err(err) => warn!("config: ignoring unreadable {SETTINGS_FILE}: {err}"),
        }
    }

    for key in ["SUPABASE_URL", "VITE_SUPABASE_URL", "WORKSHOP__BACKEND_URL"] {
        if let Some(v) = env(key) {
            settings.backend_url = Some(v);
        }
    }
    for key in ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY", "WORKSHOP__ANON_KEY"] {
        if let Some(v) = env(key) {
            settings.anon_key = Some(v);
        }
    }
    if let Some(v) = env("WORKSHOP__LOCAL_STORE_URL") {
        settings.local_store_url = normalize_local_store_url(&v);
    }
    if let Some(v) = env("WORKSHOP__IMAGE_LIST_LIMIT") {
        apply_image_list_limit(&mut settings, &v);
    }
    if let Some(v) = env("WORKSHOP__REALTIME") {
        apply_realtime_flag(&mut settings, &v);
    }

    settings
}

fn file_value(file_cfg: &HashMap<String, toml::Value>, key: &str) -> Option<String> {
    match file_cfg.get(key)? {
        toml::Value::String(v) => Some(v.clone()),
        toml::Value::Integer(v) => Some(v.to_string()),
        toml::Value::Boolean(v) => Some(v.to_string()),
        other => {
            warn!("config: unsupported value for {key}: {other}");
            None
        }
    }
}

fn apply_image_list_limit(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => settings.image_list_limit = limit,
        _ => warn!("config: ignoring invalid image_list_limit '{raw}'"),
    }
}

fn apply_realtime_flag(settings: &mut Settings, raw: &str) {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => settings.realtime_enabled = true,
        "0" | "false" | "off" | "no" => settings.realtime_enabled = false,
        _ => warn!("config: ignoring invalid realtime flag '{raw}'"),
    }
}

pub fn default_local_store_url() -> String {
    match dirs::data_dir() {
        Some(base) => LocalStore::sqlite_url_for_data_dir(&base.join(DATA_DIR_NAME)),
        None => FALLBACK_LOCAL_STORE_URL.to_string(),
    }
}

pub fn normalize_local_store_url(raw: &str) -> String {
    let raw = raw.trim();

    if raw.is_empty() {
        return default_local_store_url();
    }

    if raw.starts_with("sqlite::memory:") || raw.starts_with("sqlite://") || raw.contains("://") {
        return raw.to_string();
    }

    if let Some(path) = raw.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
