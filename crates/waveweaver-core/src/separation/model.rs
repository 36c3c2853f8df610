//! Model weights cache
//!
//! ONNX weights live as `<cache dir>/<key>.onnx`. When a download base URL is
//! configured, missing weights are fetched on first use from
//! `<base url>/<key>.onnx`; otherwise a missing file is reported as
//! [`SeparationError::ModelUnavailable`].

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::catalog::{self, ModelDescriptor};
use super::error::{Result, SeparationError};

/// Download progress callback (0.0 to 1.0)
pub type DownloadProgress = Box<dyn Fn(f32) + Send>;

/// Locates, downloads and deletes cached model weights
#[derive(Debug, Clone)]
pub struct ModelManager {
    cache_dir: PathBuf,
    download_base_url: Option<String>,
}

impl ModelManager {
    /// Manager over the platform cache directory (`<cache>/waveweaver/models`)
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir().ok_or_else(|| {
            SeparationError::ModelUnavailable("Could not determine cache directory".to_string())
        })?;
        Ok(Self::with_cache_dir(cache_dir))
    }

    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            download_base_url: None,
        }
    }

    /// Enable downloads of missing weights from `base_url`
    pub fn with_download_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.download_base_url = Some(base_url.into());
        self
    }

    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|base| base.join("waveweaver").join("models"))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local path where a model's weights are (or would be) stored
    pub fn model_path(&self, model: &ModelDescriptor) -> PathBuf {
        self.cache_dir.join(model.weights_filename())
    }

    pub fn is_model_available(&self, model: &ModelDescriptor) -> bool {
        self.model_path(model).is_file()
    }

    /// Remote location of a model's weights, if downloads are enabled
    pub fn download_url(&self, model: &ModelDescriptor) -> Option<String> {
        self.download_base_url.as_ref().map(|base| {
            format!("{}/{}", base.trim_end_matches('/'), model.weights_filename())
        })
    }

    /// Path to the model's weights, downloading them if necessary
    pub fn ensure_model(
        &self,
        model: &ModelDescriptor,
        progress: Option<DownloadProgress>,
    ) -> Result<PathBuf> {
        let model_path = self.model_path(model);

        if model_path.is_file() {
            log::info!("ensure_model: {} found at {:?}", model.name, model_path);
            if let Some(cb) = &progress {
                cb(1.0);
            }
            return Ok(model_path);
        }

        let url = self.download_url(model).ok_or_else(|| {
            SeparationError::ModelUnavailable(format!(
                "{} is not cached at {} and no download URL is configured",
                model.name,
                model_path.display()
            ))
        })?;

        log::info!("ensure_model: Downloading {} from {}", model.name, url);
        self.download_file(&url, &model_path, progress)?;
        Ok(model_path)
    }

    fn download_file(
        &self,
        url: &str,
        target_path: &Path,
        progress: Option<DownloadProgress>,
    ) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let temp_path = target_path.with_extension("tmp");

        let response = ureq::get(url)
            .call()
            .map_err(|e| SeparationError::ModelDownloadFailed(e.to_string()))?;

        let content_length: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let mut file = fs::File::create(&temp_path)?;
        let mut reader = response.into_reader();
        let mut buffer = [0u8; 8192];
        let mut downloaded: u64 = 0;

        let copied: std::io::Result<()> = (|| {
            loop {
                let bytes_read = reader.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                file.write_all(&buffer[..bytes_read])?;
                downloaded += bytes_read as u64;

                if let (Some(cb), Some(total)) = (&progress, content_length) {
                    // Capped until the size check passes
                    cb((downloaded as f32 / total as f32).min(0.99));
                }
            }
            file.flush()
        })();
        drop(file);

        if let Err(e) = copied {
            fs::remove_file(&temp_path).ok();
            return Err(SeparationError::ModelDownloadFailed(e.to_string()));
        }

        let actual_size = fs::metadata(&temp_path)?.len();
        if let Some(expected) = content_length {
            if actual_size != expected {
                fs::remove_file(&temp_path).ok();
                return Err(SeparationError::ModelDownloadFailed(format!(
                    "Download incomplete: expected {} bytes, got {}",
                    expected, actual_size
                )));
            }
        }

        fs::rename(&temp_path, target_path)?;

        log::info!(
            "download_file: Saved {:?} ({} bytes)",
            target_path.file_name().unwrap_or_default(),
            actual_size
        );

        if let Some(cb) = progress {
            cb(1.0);
        }
        Ok(())
    }

    /// Delete a model's cached weights (no-op when absent)
    pub fn delete_model(&self, model: &ModelDescriptor) -> Result<()> {
        let model_path = self.model_path(model);
        if model_path.exists() {
            fs::remove_file(&model_path)?;
            log::info!("delete_model: Deleted {:?}", model_path);
        }
        Ok(())
    }

    /// Total bytes used by cached catalog models
    pub fn cache_size(&self) -> u64 {
        catalog::all()
            .iter()
            .filter_map(|model| fs::metadata(self.model_path(model)).ok())
            .map(|m| m.len())
            .sum()
    }

    /// Delete every cached catalog model
    pub fn clear_cache(&self) -> Result<()> {
        for model in catalog::all() {
            self.delete_model(model)?;
        }
        Ok(())
    }
}
