//! Consumer side of the event contract
//!
//! [`JobMonitor`] turns the raw [`PipelineEvent`] stream into what a front end
//! shows: a monotone progress value, a status text block and the terminal
//! notifications. It also owns the synthetic animator, so a front end only
//! has to call [`JobMonitor::tick`] whenever [`JobMonitor::next_tick`] elapses.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use super::backend::ExecutionDevice;
use super::events::PipelineEvent;
use super::job::{AudioFileInfo, ProcessingResult, ProcessingStatus};
use super::naming;
use super::progress::{AnimatorPhase, ProgressDisplay, SyntheticProgress};

/// Real progress value at which the animator hands over
const HANDOVER_PROGRESS: u8 = 80;

/// What a front end should render or report
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Progress(u8),
    /// Full status text, one item per line
    Status(String),
    /// Error text from the pipeline, shown verbatim
    ErrorMessage(String),
    /// Generic failure notice for a failed result
    ExtractionFailed,
    Completed { files: Vec<PathBuf>, elapsed: Duration },
    Cancelled,
}

/// Tracks one job from the consumer's point of view
#[derive(Debug)]
pub struct JobMonitor {
    status: ProcessingStatus,
    display: ProgressDisplay,
    audio_info: Option<AudioFileInfo>,
    device: Option<ExecutionDevice>,
    animate: bool,
    animator: Option<SyntheticProgress>,
    /// Real progress held back while the animator ramps to 80
    pending: Option<u8>,
    max_filename_display: usize,
}

impl JobMonitor {
    pub fn new(animate: bool) -> Self {
        Self {
            status: ProcessingStatus::Idle,
            display: ProgressDisplay::new(),
            audio_info: None,
            device: None,
            animate,
            animator: None,
            pending: None,
            max_filename_display: 40,
        }
    }

    pub fn with_max_filename_display(mut self, max: usize) -> Self {
        self.max_filename_display = max;
        self
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.display.value()
    }

    pub fn audio_info(&self) -> Option<&AudioFileInfo> {
        self.audio_info.as_ref()
    }

    pub fn device(&self) -> Option<&ExecutionDevice> {
        self.device.as_ref()
    }

    /// Mark the job as submitted (Idle → Initializing)
    pub fn begin(&mut self) -> Vec<Notification> {
        self.display.reset();
        self.pending = None;
        self.animator = None;
        let mut out = Vec::new();
        self.transition(ProcessingStatus::Initializing, &mut out);
        out
    }

    /// Status block: status message, then device and input details
    pub fn status_text(&self) -> String {
        let mut lines = vec![self.status.message().to_string()];
        if let Some(device) = &self.device {
            lines.push(format!("Using {}", device));
        }
        if let Some(info) = &self.audio_info {
            let name = info
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            lines.push(format!(
                "{} ({})",
                naming::truncate_middle(&name, self.max_filename_display),
                info.format
            ));
            lines.push(format!("Audio Duration: {}", info.duration_formatted()));
        }
        lines.join("\n")
    }

    /// Time until [`tick`](Self::tick) should be called, if animating
    pub fn next_tick(&self) -> Option<Duration> {
        let animator = self.animator.as_ref()?;
        match animator.interval() {
            Some(interval) => Some(interval),
            None if animator.phase() == AnimatorPhase::Idle => {
                Some(SyntheticProgress::START_DELAY)
            }
            None => None,
        }
    }

    /// Advance the animator by one step
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> Vec<Notification> {
        let mut out = Vec::new();
        let Some(animator) = self.animator.as_mut() else {
            return out;
        };

        let value = if animator.is_active() {
            animator.tick(rng)
        } else {
            animator.start(rng);
            animator.is_active().then(|| animator.displayed())
        };
        let finished = !animator.is_active();

        if let Some(value) = value {
            self.show(value, &mut out);
        }
        if finished {
            self.animator = None;
            self.flush_pending(&mut out);
        }
        out
    }

    /// Consume one pipeline event
    pub fn handle(&mut self, event: PipelineEvent) -> Vec<Notification> {
        let mut out = Vec::new();
        match event {
            PipelineEvent::AudioInfo(info) => {
                self.audio_info = Some(info);
                out.push(Notification::Status(self.status_text()));
            }
            PipelineEvent::Progress(value) => self.on_progress(value, &mut out),
            PipelineEvent::StatusChanged(status) => self.transition(status, &mut out),
            PipelineEvent::DeviceInfo(device) => {
                self.device = Some(device);
                out.push(Notification::Status(self.status_text()));
            }
            PipelineEvent::Error(message) => {
                out.push(Notification::ErrorMessage(message));
            }
            PipelineEvent::Result(result) => self.on_result(result, &mut out),
        }
        out
    }

    fn show(&mut self, value: u8, out: &mut Vec<Notification>) {
        if self.display.apply(value) {
            out.push(Notification::Progress(self.display.value()));
        }
    }

    fn flush_pending(&mut self, out: &mut Vec<Notification>) {
        if let Some(value) = self.pending.take() {
            self.show(value, out);
        }
    }

    fn stop_animator(&mut self, out: &mut Vec<Notification>) {
        if let Some(mut animator) = self.animator.take() {
            animator.stop();
        }
        self.flush_pending(out);
    }

    fn on_progress(&mut self, value: u8, out: &mut Vec<Notification>) {
        let animating = self
            .animator
            .as_ref()
            .map(|a| a.is_active())
            .unwrap_or(false);

        if value >= HANDOVER_PROGRESS && self.animator.is_some() {
            if animating {
                if let Some(animator) = self.animator.as_mut() {
                    animator.begin_ramp();
                }
                self.pending = Some(self.pending.map_or(value, |p| p.max(value)));
                if self.animator.as_ref().map(|a| a.is_active()) == Some(false) {
                    self.animator = None;
                    self.flush_pending(out);
                }
                return;
            }
            // Never started (still in its start delay)
            self.animator = None;
        }
        self.show(value, out);
    }

    fn on_result(&mut self, result: ProcessingResult, out: &mut Vec<Notification>) {
        self.stop_animator(out);
        if result.success {
            out.push(Notification::Completed {
                files: result.output_files,
                elapsed: result.elapsed,
            });
        } else {
            out.push(Notification::ExtractionFailed);
        }
    }

    fn transition(&mut self, next: ProcessingStatus, out: &mut Vec<Notification>) {
        if !self.status.can_transition_to(next) {
            log::warn!(
                "JobMonitor: Ignoring status change {} -> {}",
                self.status,
                next
            );
            return;
        }
        self.status = next;

        match next {
            ProcessingStatus::Processing if self.animate => {
                let duration = self.audio_info.as_ref().map(|i| i.duration).unwrap_or(0.0);
                let accelerated = self
                    .device
                    .as_ref()
                    .map(ExecutionDevice::is_accelerated)
                    .unwrap_or(false);
                self.animator = Some(SyntheticProgress::new(duration, accelerated));
            }
            ProcessingStatus::Completed | ProcessingStatus::Error => self.stop_animator(out),
            ProcessingStatus::Cancelled => {
                self.animator = None;
                self.pending = None;
            }
            _ => {}
        }

        out.push(Notification::Status(self.status_text()));
        if next == ProcessingStatus::Cancelled {
            out.push(Notification::Cancelled);
        }
    }
}
