use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use client_core::transport::DEFAULT_REQUEST_TIMEOUT;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "desk.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskSettings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            log_filter: "info".into(),
        }
    }
}

impl DeskSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then the config file, then the environment. An explicitly
/// requested file must exist; the default `desk.toml` is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<DeskSettings> {
    let mut settings = DeskSettings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if let Some(file) = read_file_settings(&path, required)? {
        apply_file(&mut settings, file);
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    settings.server_url = normalize_server_url(&settings.server_url)?;
    Ok(settings)
}

fn read_file_settings(path: &Path, required: bool) -> anyhow::Result<Option<FileSettings>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };
    let file = toml::from_str::<FileSettings>(&raw)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
    Ok(Some(file))
}

fn apply_file(settings: &mut DeskSettings, file: FileSettings) {
    if let Some(v) = file.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
}

fn apply_env(
    settings: &mut DeskSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("DESK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("DESK_REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v
            .trim()
            .parse()
            .with_context(|| format!("DESK_REQUEST_TIMEOUT_SECS must be whole seconds, got '{v}'"))?;
    }

    if let Some(v) = lookup("DESK_LOG") {
        settings.log_filter = v;
    }

    Ok(())
}

/// Trims, requires an http(s) scheme and strips trailing slashes.
pub fn normalize_server_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("server url is empty");
    }
    let url = Url::parse(trimmed).with_context(|| format!("invalid server url '{trimmed}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("server url '{trimmed}' must use http or https");
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
