//! Events a running job sends to its consumer

use super::backend::ExecutionDevice;
use super::job::{AudioFileInfo, ProcessingResult, ProcessingStatus};

/// One notification from the separation worker
///
/// A successful job emits, in order:
///
/// ```text
/// AudioInfo → Progress(5) → StatusChanged(LoadingModel) → Progress(10)
///   → DeviceInfo → StatusChanged(Processing) → Progress(15) → Progress(80)
///   → StatusChanged(Saving) → Progress(..) per stem up to 100
///   → StatusChanged(Completed) → Result(success)
/// ```
///
/// A failure anywhere ends with `Error`, `StatusChanged(Error)` and a failed
/// `Result`. A cancelled job ends with `StatusChanged(Cancelled)` and no
/// `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    AudioInfo(AudioFileInfo),
    /// Overall progress, 0 to 100
    Progress(u8),
    StatusChanged(ProcessingStatus),
    DeviceInfo(ExecutionDevice),
    /// Display text of the error that ended the job
    Error(String),
    Result(ProcessingResult),
}

impl PipelineEvent {
    /// Whether no further events follow this one
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Result(_) | Self::StatusChanged(ProcessingStatus::Cancelled)
        )
    }
}
