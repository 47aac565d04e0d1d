use std::fs;

use anyhow::{bail, Context};
use serde::Deserialize;
use shared::domain::Difficulty;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub difficulty: Difficulty,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8005".into(),
            difficulty: Difficulty::Easy,
            request_timeout_secs: None,
        }
    }
}

/// Keys accepted from `calcduo.toml`; every field is optional so a partial
/// file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    server_url: Option<String>,
    difficulty: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// Builds the effective settings: defaults, then `calcduo.toml` (path
/// overridable via `CALCDUO_CONFIG`), then environment variables. CLI flags
/// are applied afterwards by [`apply_cli_overrides`].
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    let config_path =
        std::env::var("CALCDUO_CONFIG").unwrap_or_else(|_| "calcduo.toml".to_string());
    if let Ok(raw) = fs::read_to_string(&config_path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(error) => warn!(%config_path, %error, "config: ignoring unparseable file"),
        }
    }

    if let Ok(v) = std::env::var("CALCDUO_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("CALCDUO_DIFFICULTY") {
        apply_difficulty(&mut settings, &v);
    }
    if let Ok(v) = std::env::var("CALCDUO_REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = Some(parsed);
        }
    }

    settings
}

pub fn apply_cli_overrides(
    settings: &mut Settings,
    server_url: Option<&str>,
    difficulty: Option<Difficulty>,
    timeout_secs: Option<u64>,
) {
    if let Some(v) = server_url {
        settings.server_url = v.to_string();
    }
    if let Some(v) = difficulty {
        settings.difficulty = v;
    }
    if let Some(v) = timeout_secs {
        settings.request_timeout_secs = Some(v);
    }
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.difficulty {
        apply_difficulty(settings, &v);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = Some(v);
    }
}

fn apply_difficulty(settings: &mut Settings, raw: &str) {
    match raw.parse::<Difficulty>() {
        Ok(level) => settings.difficulty = level,
        Err(error) => warn!(%error, "config: keeping difficulty {}", settings.difficulty),
    }
}

/// Validates the configured base address (http or https only) and trims any
/// trailing slash so request paths can be appended directly.
pub fn normalize_server_url(raw: &str) -> anyhow::Result<String> {
    let parsed =
        Url::parse(raw.trim()).with_context(|| format!("invalid server url '{raw}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("server url '{raw}' must use http or https");
    }
    let mut normalized = parsed.to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }
    Ok(normalized)
}
