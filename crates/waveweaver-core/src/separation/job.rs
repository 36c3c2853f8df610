//! Job description, lifecycle status and outcome types

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::catalog::{self, ModelDescriptor};
use super::error::{Result, SeparationError};
use crate::types::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, UNKNOWN_FORMAT};

/// One separation request: one input file, one model, one or more stems
///
/// Immutable once built. The pipeline that runs it owns it exclusively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingJob {
    input: PathBuf,
    output_dir: PathBuf,
    model: String,
    stems: Vec<String>,
}

impl ProcessingJob {
    pub fn new<I, S>(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        model: impl Into<String>,
        stems: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            model: model.into(),
            stems: stems.into_iter().map(Into::into).collect(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Requested stems, in the order they will be written
    pub fn stems(&self) -> &[String] {
        &self.stems
    }

    /// Check the job against the catalog without touching the filesystem
    ///
    /// Fails on an empty or duplicated stem list, an unknown model, or a stem
    /// outside the model's vocabulary.
    pub fn validate(&self) -> Result<&'static ModelDescriptor> {
        if self.stems.is_empty() {
            return Err(SeparationError::InvalidJob(
                "at least one stem must be selected".to_string(),
            ));
        }
        for (i, stem) in self.stems.iter().enumerate() {
            if self.stems[..i].contains(stem) {
                return Err(SeparationError::InvalidJob(format!(
                    "stem '{}' requested more than once",
                    stem
                )));
            }
        }

        let descriptor = catalog::resolve(&self.model)?;
        descriptor.validate_stems(&self.stems)?;
        Ok(descriptor)
    }
}

/// Lifecycle state of a job
///
/// States only move forward along
/// `Idle → Initializing → LoadingModel → Processing → Saving → Completed`.
/// `Error` and `Cancelled` can interrupt any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Initializing,
    LoadingModel,
    Processing,
    Saving,
    Completed,
    Error,
    Cancelled,
}

impl ProcessingStatus {
    /// Message shown next to the progress bar
    pub fn message(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Initializing => "Initializing...",
            Self::LoadingModel => "Loading model...",
            Self::Processing => "Processing audio...",
            Self::Saving => "Saving stems...",
            Self::Completed => "Extraction complete!",
            Self::Error => "Error occurred!",
            Self::Cancelled => "Operation cancelled!",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Position on the forward path; `None` for the early-exit states
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Initializing => Some(1),
            Self::LoadingModel => Some(2),
            Self::Processing => Some(3),
            Self::Saving => Some(4),
            Self::Completed => Some(5),
            Self::Error | Self::Cancelled => None,
        }
    }

    /// Whether a job in this state may move to `next`
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next > current,
            (None, Some(_)) => false,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::LoadingModel => "loading_model",
            Self::Processing => "processing",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Advisory metadata about the input file, probed once per job
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFileInfo {
    pub path: PathBuf,
    /// Duration in seconds (0 when unknown)
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Container format, e.g. "WAV" or "MP3"
    pub format: String,
}

impl AudioFileInfo {
    /// Metadata used when probing fails
    pub fn fallback(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration: 0.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            format: UNKNOWN_FORMAT.to_string(),
        }
    }

    /// Duration as `M:SS`
    pub fn duration_formatted(&self) -> String {
        super::naming::format_duration(self.duration)
    }
}

/// Terminal outcome of a job, produced once at Completed or Error
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub success: bool,
    /// Written stem files, in request order (empty on failure)
    pub output_files: Vec<PathBuf>,
    pub error_message: Option<String>,
    pub elapsed: Duration,
}

impl ProcessingResult {
    pub fn success(output_files: Vec<PathBuf>, elapsed: Duration) -> Self {
        Self {
            success: true,
            output_files,
            error_message: None,
            elapsed,
        }
    }

    pub fn failure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            output_files: Vec::new(),
            error_message: Some(message.into()),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(model: &str, stems: &[&str]) -> ProcessingJob {
        ProcessingJob::new("in.wav", "out", model, stems.iter().copied())
    }

    #[test]
    fn test_validate_accepts_subset_in_any_order() {
        let descriptor = job("htdemucs", &["vocals", "drums"]).validate().unwrap();
        assert_eq!(descriptor.key, "htdemucs");
    }

    #[test]
    fn test_validate_rejects_empty_stems() {
        let err = job("htdemucs", &[]).validate().unwrap_err();
        assert!(matches!(err, SeparationError::InvalidJob(_)));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let err = job("htdemucs", &["bass", "bass"]).validate().unwrap_err();
        assert!(matches!(err, SeparationError::InvalidJob(_)));
    }

    #[test]
    fn test_validate_unknown_model_and_stem() {
        assert!(matches!(
            job("nope", &["vocals"]).validate(),
            Err(SeparationError::ModelNotFound(_))
        ));
        assert!(matches!(
            job("htdemucs", &["vocals", "piano"]).validate(),
            Err(SeparationError::StemNotFound { .. })
        ));
    }

    #[test]
    fn test_forward_path_is_strict() {
        use ProcessingStatus::*;
        let path = [Idle, Initializing, LoadingModel, Processing, Saving, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(pair[0]), "{} -> {}", pair[1], pair[0]);
        }
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Saving.can_transition_to(LoadingModel));
    }

    #[test]
    fn test_early_exit_from_every_non_terminal_state() {
        use ProcessingStatus::*;
        for state in [Idle, Initializing, LoadingModel, Processing, Saving] {
            assert!(state.can_transition_to(Cancelled));
            assert!(state.can_transition_to(Error));
        }
        for terminal in [Completed, Error, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Cancelled));
            assert!(!terminal.can_transition_to(Idle));
        }
    }

    #[test]
    fn test_fallback_audio_info() {
        let info = AudioFileInfo::fallback("broken.mp3");
        assert_eq!(info.duration, 0.0);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.format, "unknown");
        assert_eq!(info.duration_formatted(), "0:00");
    }

    #[test]
    fn test_result_constructors() {
        let ok = ProcessingResult::success(vec![PathBuf::from("a.wav")], Duration::from_secs(3));
        assert!(ok.success);
        assert!(ok.error_message.is_none());

        let failed = ProcessingResult::failure("boom", Duration::ZERO);
        assert!(!failed.success);
        assert!(failed.output_files.is_empty());
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }
}
