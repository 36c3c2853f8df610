//! Audio stem separation
//!
//! Splits one mixed audio file into the stems a pretrained model produces
//! (vocals, drums, bass, ...) and writes each as a WAV file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SeparationPipeline                      │
//! │  • Runs one ProcessingJob on a worker thread            │
//! │  • Emits PipelineEvents over a crossbeam channel        │
//! │  • Cooperative cancellation between stages              │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              ModelProvider (trait)                       │
//! │  • load() - weights → SeparationModel                   │
//! │  • device() - CPU or accelerator                        │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │    OrtProvider      │
//!                   │ (ONNX Runtime, ort) │
//!                   └─────────────────────┘
//! ```
//!
//! On the consumer side, [`JobMonitor`] folds the event stream into progress,
//! status text and terminal notifications.

mod audio;
mod backend;
pub mod catalog;
mod error;
mod events;
mod job;
mod model;
mod monitor;
pub mod naming;
mod pipeline;
mod progress;

pub use audio::{load_waveform, probe_audio_info, probe_or_default, write_stem_wav, DecodedAudio, StemSampleFormat};
pub use backend::{apply_shifts, to_stereo, ExecutionDevice, ModelProvider, OrtProvider, SeparationModel};
pub use catalog::ModelDescriptor;
pub use error::{Result, SeparationError};
pub use events::PipelineEvent;
pub use job::{AudioFileInfo, ProcessingJob, ProcessingResult, ProcessingStatus};
pub use model::{DownloadProgress, ModelManager};
pub use monitor::{JobMonitor, Notification};
pub use pipeline::{run_job, run_job_with, CancelFlag, JobOutcome, OutputOptions, SeparationPipeline};
pub use progress::{AnimatorPhase, ProgressDisplay, SyntheticProgress};
