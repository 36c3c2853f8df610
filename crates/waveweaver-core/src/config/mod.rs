//! User settings for Waveweaver front-ends
//!
//! Settings are stored as YAML. Default location:
//! `<platform config dir>/waveweaver/config.yaml`
//!
//! A few values can be overridden from the environment after the file is
//! loaded:
//!
//! | Variable | Setting |
//! |---|---|
//! | `WAVEWEAVER_DEFAULT_MODEL` | `model.default_model` |
//! | `WAVEWEAVER_MODEL_CACHE_DIR` | `model.cache_dir` |
//! | `WAVEWEAVER_SHIFTS` | `model.shifts` |
//! | `WAVEWEAVER_MODEL_BASE_URL` | `model.download_base_url` |

mod io;

pub use io::{load_yaml, save_yaml};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::separation::{catalog, ModelManager, OutputOptions, StemSampleFormat};
use crate::types::DEFAULT_MAX_NAME_LENGTH;

/// Model used when neither the config nor the command line picks one
pub const DEFAULT_MODEL: &str = "htdemucs_ft";

/// Config file name inside the app config directory
pub const CONFIG_FILENAME: &str = "config.yaml";

/// `<platform config dir>/waveweaver/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("waveweaver").join(CONFIG_FILENAME))
}

/// Root settings structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub output: OutputSettings,
    pub ui: UiSettings,
}

/// Model selection and weights cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Catalog key preselected for new jobs
    pub default_model: String,
    /// Weights cache (default: `<platform cache dir>/waveweaver/models`)
    pub cache_dir: Option<PathBuf>,
    /// Random-shift passes averaged per inference (0-10, 0 = single pass)
    pub shifts: u32,
    /// Where missing weights are downloaded from; no downloads when unset
    pub download_base_url: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            shifts: 2,
            download_base_url: None,
        }
    }
}

/// Stem file output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub sample_format: StemSampleFormat,
    /// Max chars of the input base name kept in stem file names (8-120)
    pub max_name_length: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            sample_format: StemSampleFormat::Float32,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

/// Presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// File names longer than this are middle-truncated in status text
    pub max_filename_display: usize,
    /// Animate the progress bar while inference runs
    pub artificial_progress: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            max_filename_display: 40,
            artificial_progress: true,
        }
    }
}

impl Settings {
    /// Load from `path` (or the default location), apply environment
    /// overrides and validate
    pub fn load(path: Option<&Path>) -> Self {
        let mut settings: Settings = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => load_yaml(&path),
            None => {
                log::warn!("Settings::load: No config directory available, using defaults");
                Settings::default()
            }
        };
        settings.apply_env_overrides();
        settings.validate();
        settings
    }

    /// Save to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_yaml(self, path)
    }

    /// Apply `WAVEWEAVER_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("WAVEWEAVER_DEFAULT_MODEL") {
            self.model.default_model = model;
        }
        if let Some(dir) = lookup("WAVEWEAVER_MODEL_CACHE_DIR") {
            self.model.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(shifts) = lookup("WAVEWEAVER_SHIFTS") {
            match shifts.trim().parse::<u32>() {
                Ok(value) => self.model.shifts = value,
                Err(e) => log::warn!(
                    "apply_overrides_from: Ignoring WAVEWEAVER_SHIFTS={:?}: {}",
                    shifts,
                    e
                ),
            }
        }
        if let Some(url) = lookup("WAVEWEAVER_MODEL_BASE_URL") {
            self.model.download_base_url = Some(url);
        }
    }

    /// Clamp numeric settings to their supported ranges
    pub fn validate(&mut self) {
        self.model.shifts = self.model.shifts.min(10);
        self.output.max_name_length = self.output.max_name_length.clamp(8, 120);

        if catalog::find(&self.model.default_model).is_none() {
            log::warn!(
                "Settings::validate: Unknown default model '{}', using '{}'",
                self.model.default_model,
                DEFAULT_MODEL
            );
            self.model.default_model = DEFAULT_MODEL.to_string();
        }
    }

    /// Weights cache manager for these settings
    pub fn model_manager(&self) -> crate::separation::Result<ModelManager> {
        let manager = match &self.model.cache_dir {
            Some(dir) => ModelManager::with_cache_dir(dir.clone()),
            None => ModelManager::new()?,
        };
        Ok(match &self.model.download_base_url {
            Some(url) => manager.with_download_base_url(url.clone()),
            None => manager,
        })
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            sample_format: self.output.sample_format,
            max_name_length: self.output.max_name_length,
        }
    }
}
