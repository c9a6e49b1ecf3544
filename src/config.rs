use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::sentinel::RecoveryMode;

/// One `[profiles.<name>]` table.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub model: Option<String>,
    pub host: Option<String>,
    pub timeout: Option<u64>,
    pub recovery: Option<String>,
    pub normalize_images: Option<bool>,
    pub output: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let path = config_path()?;
    let config = read_config(&path)?;
    find_profile(config, name, &path)
}

/// Checks that the config file parses and its values are usable.
///
/// Returns the path that was checked.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, String> {
    let path = config_path()?;
    let config = read_config(&path)?;

    if let Some(profiles) = &config.profiles {
        let mut names: Vec<&String> = profiles.keys().collect();
        names.sort();
        for name in names {
            validate_profile(name, &profiles[name], &path)?;
        }
    }

    if let Some(name) = profile {
        find_profile(config, name, &path)?;
    }

    Ok(path)
}

fn read_config(path: &Path) -> Result<ConfigFile, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> Result<ConfigFile, String> {
    toml::from_str(raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))
}

fn find_profile(config: ConfigFile, name: &str, path: &Path) -> Result<ProfileConfig, String> {
    let mut profiles = config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })?;

    profiles.remove(name).ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })
}

fn validate_profile(name: &str, profile: &ProfileConfig, path: &Path) -> Result<(), String> {
    if let Some(recovery) = &profile.recovery {
        if RecoveryMode::parse(recovery).is_none() {
            return Err(format!(
                "Profile '{name}' in '{}' has invalid recovery '{recovery}'. Supported values: {}.",
                path.display(),
                RecoveryMode::SUPPORTED
            ));
        }
    }
    if let Some(output) = &profile.output {
        if !matches!(output.trim(), "text" | "json") {
            return Err(format!(
                "Profile '{name}' in '{}' has invalid output '{output}'. Supported values: text, json.",
                path.display()
            ));
        }
    }
    if let Some(model) = &profile.model {
        if model.trim().is_empty() {
            return Err(format!(
                "Profile '{name}' in '{}' has an empty model.",
                path.display()
            ));
        }
    }
    Ok(())
}

fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var("ECO_CONFIG") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed)
                .join("ecosentinel")
                .join("config.toml"));
        }
    }

    let home = env::var("HOME").map_err(|_| {
        "Cannot resolve config path: set ECO_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("ecosentinel")
        .join("config.toml"))
}
