//! YAML load/save for any serde settings type

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read `path` as YAML
///
/// A missing file gives `T::default()`. So does an unreadable or invalid
/// one, with a warning; a broken config never stops the app from starting.
pub fn load_yaml<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_yaml: {:?} not found, using defaults", path);
        return T::default();
    }

    let parsed = std::fs::read_to_string(path)
        .context("read failed")
        .and_then(|contents| serde_yaml::from_str::<T>(&contents).context("parse failed"));

    match parsed {
        Ok(value) => {
            log::info!("load_yaml: Loaded {:?}", path);
            value
        }
        Err(e) => {
            log::warn!("load_yaml: Ignoring {:?} ({:#}), using defaults", path, e);
            T::default()
        }
    }
}

/// Write `value` to `path` as YAML, creating parent directories
pub fn save_yaml<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(value).context("Failed to serialize settings to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_yaml: Saved {:?}", path);
    Ok(())
}
