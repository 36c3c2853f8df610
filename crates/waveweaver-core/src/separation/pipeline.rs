//! Separation pipeline: one job, one worker thread, one event stream
//!
//! [`run_job`] is the whole pipeline as a plain synchronous function. It has
//! no knowledge of threads or UI and is what the tests drive directly.
//! [`SeparationPipeline`] runs it on a named worker thread and hands events to
//! a crossbeam channel.
//!
//! Cancellation is cooperative. The flag is checked after the audio is
//! loaded, after inference returns and before each stem file is written.
//! Inference itself is never interrupted.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::Sender;
use ndarray::Axis;

use super::audio::{self, StemSampleFormat};
use super::backend::ModelProvider;
use super::error::{Result, SeparationError};
use super::events::PipelineEvent;
use super::job::{ProcessingJob, ProcessingResult, ProcessingStatus};
use super::naming;
use crate::types::DEFAULT_MAX_NAME_LENGTH;

/// Cooperative cancellation flag shared between a job and its controller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How stem files are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    pub sample_format: StemSampleFormat,
    /// Max chars of the input base name kept in stem file names
    pub max_name_length: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            sample_format: StemSampleFormat::Float32,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

/// How a job ended, as seen by whoever ran it
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(ProcessingResult),
    Failed(ProcessingResult),
    Cancelled,
}

impl JobOutcome {
    /// The job's result, absent when it was cancelled
    pub fn result(&self) -> Option<&ProcessingResult> {
        match self {
            Self::Completed(result) | Self::Failed(result) => Some(result),
            Self::Cancelled => None,
        }
    }
}

/// Event sink wrapping a delivery callback
struct Emitter<F: Fn(PipelineEvent)> {
    sink: F,
}

impl<F: Fn(PipelineEvent)> Emitter<F> {
    fn emit(&self, event: PipelineEvent) {
        (self.sink)(event);
    }

    fn progress(&self, value: u8) {
        self.emit(PipelineEvent::Progress(value));
    }

    fn status(&self, status: ProcessingStatus) {
        self.emit(PipelineEvent::StatusChanged(status));
    }
}

/// Text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Progress after `written` of `total` stems, spread over 80..=100
fn saving_progress(written: usize, total: usize) -> u8 {
    (80 + 20 * written / total.max(1)) as u8
}

/// Run `job` to completion, failure or cancellation
///
/// Events go to `events`; a disconnected receiver is ignored.
pub fn run_job(
    job: &ProcessingJob,
    provider: &dyn ModelProvider,
    options: &OutputOptions,
    cancel: &CancelFlag,
    events: &Sender<PipelineEvent>,
) -> JobOutcome {
    run_job_with(job, provider, options, cancel, |event| {
        if events.send(event).is_err() {
            log::debug!("run_job: Event receiver disconnected");
        }
    })
}

/// [`run_job`] delivering each event to `sink` instead of a channel
///
/// Every error raised by any stage, including a panic inside the provider or
/// model, is reported here as `Error`, `StatusChanged(Error)` and a failed
/// `Result`, in that order.
pub fn run_job_with<F>(
    job: &ProcessingJob,
    provider: &dyn ModelProvider,
    options: &OutputOptions,
    cancel: &CancelFlag,
    sink: F,
) -> JobOutcome
where
    F: Fn(PipelineEvent),
{
    let start = Instant::now();
    let emitter = Emitter { sink };

    log::info!(
        "run_job: {:?} with model {} ({} stem(s)) via {}",
        job.input(),
        job.model(),
        job.stems().len(),
        provider.name()
    );

    let executed = panic::catch_unwind(AssertUnwindSafe(|| {
        execute(job, provider, options, cancel, &emitter)
    }))
    .unwrap_or_else(|payload| {
        Err(SeparationError::WorkerPanicked(panic_message(payload.as_ref())))
    });

    match executed {
        Ok(Some(output_files)) => {
            let result = ProcessingResult::success(output_files, start.elapsed());
            log::info!(
                "run_job: Completed {} file(s) in {:.1}s",
                result.output_files.len(),
                result.elapsed.as_secs_f64()
            );
            emitter.status(ProcessingStatus::Completed);
            emitter.emit(PipelineEvent::Result(result.clone()));
            JobOutcome::Completed(result)
        }
        Ok(None) => {
            log::info!("run_job: Cancelled after {:.1}s", start.elapsed().as_secs_f64());
            emitter.status(ProcessingStatus::Cancelled);
            JobOutcome::Cancelled
        }
        Err(e) => {
            let message = e.to_string();
            log::warn!("run_job: Failed: {}", message);
            emitter.emit(PipelineEvent::Error(message.clone()));
            emitter.status(ProcessingStatus::Error);
            let result = ProcessingResult::failure(message, start.elapsed());
            emitter.emit(PipelineEvent::Result(result.clone()));
            JobOutcome::Failed(result)
        }
    }
}

/// Stage sequence; `Ok(None)` means a checkpoint saw the cancel flag
fn execute(
    job: &ProcessingJob,
    provider: &dyn ModelProvider,
    options: &OutputOptions,
    cancel: &CancelFlag,
    emitter: &Emitter<impl Fn(PipelineEvent)>,
) -> Result<Option<Vec<PathBuf>>> {
    // 1. Metadata (advisory)
    let info = audio::probe_or_default(job.input());
    emitter.emit(PipelineEvent::AudioInfo(info));
    emitter.progress(5);

    // 2. Model: validate the request before any expensive work
    emitter.status(ProcessingStatus::LoadingModel);
    let descriptor = job.validate()?;
    let stem_indices = job
        .stems()
        .iter()
        .map(|stem| descriptor.require_stem(stem))
        .collect::<Result<Vec<usize>>>()?;
    let mut model = provider.load(descriptor)?;
    emitter.progress(10);
    emitter.emit(PipelineEvent::DeviceInfo(provider.device()));

    // 3. Audio
    emitter.status(ProcessingStatus::Processing);
    let decoded = audio::load_waveform(job.input())?;
    emitter.progress(15);

    if cancel.is_cancelled() {
        return Ok(None);
    }

    // 4. Inference over the whole waveform
    log::info!(
        "execute: Separating {:.1}s of audio with {}",
        decoded.duration_secs(),
        descriptor.name
    );
    let sources = model.infer(&decoded.waveform)?;
    if sources.len_of(Axis(0)) != descriptor.stem_count() {
        return Err(SeparationError::InferenceFailed(format!(
            "Model returned {} sources, expected {}",
            sources.len_of(Axis(0)),
            descriptor.stem_count()
        )));
    }
    emitter.progress(80);

    if cancel.is_cancelled() {
        return Ok(None);
    }

    // 5. Stems, in request order
    emitter.status(ProcessingStatus::Saving);
    let folder = naming::output_folder(job.output_dir(), job.input());
    std::fs::create_dir_all(&folder)?;
    let base_name = naming::input_base_name(job.input());

    let total = job.stems().len();
    let mut output_files = Vec::with_capacity(total);
    for (written, (stem, &index)) in job.stems().iter().zip(&stem_indices).enumerate() {
        if cancel.is_cancelled() {
            log::info!("execute: Cancelled with {}/{} stem(s) written", written, total);
            return Ok(None);
        }

        let path = folder.join(naming::stem_file_name(&base_name, stem, options.max_name_length));
        audio::write_stem_wav(
            &path,
            sources.index_axis(Axis(0), index),
            decoded.sample_rate,
            options.sample_format,
        )?;
        log::info!("execute: Wrote {:?}", path);
        output_files.push(path);
        emitter.progress(saving_progress(written + 1, total));
    }

    Ok(Some(output_files))
}

/// Runs one job on a background worker thread
///
/// Each instance accepts exactly one [`start`](Self::start); run another job
/// with a fresh instance.
pub struct SeparationPipeline {
    provider: Arc<dyn ModelProvider>,
    options: OutputOptions,
    cancel: CancelFlag,
    handle: Option<JoinHandle<JobOutcome>>,
    started: bool,
}

impl SeparationPipeline {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            options: OutputOptions::default(),
            cancel: CancelFlag::new(),
            handle: None,
            started: false,
        }
    }

    pub fn with_output_options(mut self, options: OutputOptions) -> Self {
        self.options = options;
        self
    }

    /// Spawn the worker; returns immediately
    ///
    /// All outcomes arrive on `events`.
    pub fn start(&mut self, job: ProcessingJob, events: Sender<PipelineEvent>) -> Result<()> {
        if self.started {
            return Err(SeparationError::AlreadyStarted);
        }

        let provider = Arc::clone(&self.provider);
        let options = self.options;
        let cancel = self.cancel.clone();

        let handle = thread::Builder::new()
            .name("separation-worker".to_string())
            .spawn(move || run_job(&job, provider.as_ref(), &options, &cancel, &events))?;

        self.started = true;
        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the running job to stop at its next checkpoint
    pub fn cancel(&self) {
        log::info!("SeparationPipeline: Cancellation requested");
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the worker and return how the job ended
    ///
    /// `None` if the job was never started, was already joined, or the worker
    /// panicked.
    pub fn join(&mut self) -> Option<JobOutcome> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                log::error!("SeparationPipeline: Worker thread panicked");
                None
            }
        }
    }
}

impl Drop for SeparationPipeline {
    fn drop(&mut self) {
        if self.is_running() {
            // Let a detached worker skip its remaining stems
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::backend::{ExecutionDevice, SeparationModel};
    use crate::separation::catalog::ModelDescriptor;
    use crate::types::{Sources, Waveform};
    use crossbeam::channel::{unbounded, Receiver};
    use ndarray::{concatenate, Array3};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        loads: AtomicUsize,
        inferences: AtomicUsize,
    }

    /// Stem k is the input scaled by (k + 1) / 10
    struct FakeProvider {
        counters: Arc<Counters>,
        fail_inference: bool,
        panic_on_infer: bool,
        cancel_during_inference: Option<CancelFlag>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                counters: Arc::new(Counters::default()),
                fail_inference: false,
                panic_on_infer: false,
                cancel_during_inference: None,
            }
        }
    }

    struct FakeModel {
        stems: usize,
        counters: Arc<Counters>,
        fail: bool,
        panic: bool,
        cancel: Option<CancelFlag>,
    }

    impl SeparationModel for FakeModel {
        fn infer(&mut self, waveform: &Waveform) -> Result<Sources> {
            self.counters.inferences.fetch_add(1, Ordering::SeqCst);
            if let Some(flag) = &self.cancel {
                flag.cancel();
            }
            if self.panic {
                panic!("model exploded");
            }
            if self.fail {
                return Err(SeparationError::InferenceFailed("out of memory".to_string()));
            }
            let stems: Vec<Array3<f32>> = (0..self.stems)
                .map(|k| (waveform * ((k + 1) as f32 / 10.0)).insert_axis(Axis(0)))
                .collect();
            let views: Vec<_> = stems.iter().map(|s| s.view()).collect();
            concatenate(Axis(0), &views).map_err(|e| SeparationError::InferenceFailed(e.to_string()))
        }
    }

    impl ModelProvider for FakeProvider {
        fn load(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn SeparationModel>> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeModel {
                stems: descriptor.stem_count(),
                counters: Arc::clone(&self.counters),
                fail: self.fail_inference,
                panic: self.panic_on_infer,
                cancel: self.cancel_during_inference.clone(),
            }))
        }

        fn device(&self) -> ExecutionDevice {
            ExecutionDevice::Cpu
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn write_fixture(path: &Path, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample(((i % 100) as i16 - 50) * 200).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn drain(rx: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        rx.try_iter().collect()
    }

    fn run(
        job: &ProcessingJob,
        provider: &FakeProvider,
        cancel: &CancelFlag,
    ) -> (JobOutcome, Vec<PipelineEvent>) {
        let (tx, rx) = unbounded();
        let outcome = run_job(job, provider, &OutputOptions::default(), cancel, &tx);
        (outcome, drain(&rx))
    }

    /// Event kinds without payloads, for order assertions
    fn kinds(events: &[PipelineEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                PipelineEvent::AudioInfo(_) => "info".to_string(),
                PipelineEvent::Progress(v) => format!("p{}", v),
                PipelineEvent::StatusChanged(s) => s.to_string(),
                PipelineEvent::DeviceInfo(_) => "device".to_string(),
                PipelineEvent::Error(_) => "error_msg".to_string(),
                PipelineEvent::Result(r) => format!("result:{}", r.success),
            })
            .collect()
    }

    #[test]
    fn test_success_event_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("My Song.wav");
        write_fixture(&input, 2, 2000);
        let out = dir.path().join("out");

        let job = ProcessingJob::new(&input, &out, "htdemucs", ["vocals", "drums"]);
        let (outcome, events) = run(&job, &FakeProvider::new(), &CancelFlag::new());

        assert_eq!(
            kinds(&events),
            vec![
                "info", "p5", "loading_model", "p10", "device", "processing", "p15", "p80",
                "saving", "p90", "p100", "completed", "result:true"
            ]
        );

        let result = outcome.result().unwrap();
        assert_eq!(
            result.output_files,
            vec![
                out.join("My Song").join("My Song - vocals.wav"),
                out.join("My Song").join("My Song - drums.wav"),
            ]
        );
        assert!(result.output_files.iter().all(|p| p.is_file()));
    }

    #[test]
    fn test_stems_come_from_vocabulary_index() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mix.wav");
        write_fixture(&input, 1, 500);

        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["vocals"]);
        let (outcome, _) = run(&job, &FakeProvider::new(), &CancelFlag::new());

        let path = &outcome.result().unwrap().output_files[0];
        let mut stem = hound::WavReader::open(path).unwrap();
        let mut mix = hound::WavReader::open(&input).unwrap();
        // vocals is index 3 → scaled by 0.4
        let stem_samples: Vec<f32> = stem.samples::<f32>().map(|s| s.unwrap()).collect();
        let mix_samples: Vec<f32> = mix
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / 32768.0)
            .collect();
        assert_eq!(stem_samples.len(), mix_samples.len());
        for (s, m) in stem_samples.iter().zip(&mix_samples) {
            assert!((s - m * 0.4).abs() < 1e-4);
        }
    }

    #[test]
    fn test_unknown_stem_fails_before_inference() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let provider = FakeProvider::new();
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["vocals", "piano"]);
        let (outcome, events) = run(&job, &provider, &CancelFlag::new());

        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert_eq!(
            kinds(&events),
            vec!["info", "p5", "loading_model", "error_msg", "error", "result:false"]
        );
        assert_eq!(provider.counters.loads.load(Ordering::SeqCst), 0);
        assert_eq!(provider.counters.inferences.load(Ordering::SeqCst), 0);
        match &events[3] {
            PipelineEvent::Error(msg) => assert!(msg.contains("piano")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let job = ProcessingJob::new(&input, dir.path(), "umx", ["vocals"]);
        let (outcome, _) = run(&job, &FakeProvider::new(), &CancelFlag::new());
        let result = outcome.result().unwrap();
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("Model not found: umx"));
    }

    #[test]
    fn test_corrupt_input_probes_defaults_then_fails_decode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.mp3");
        std::fs::write(&input, b"garbage bytes").unwrap();

        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass"]);
        let (outcome, events) = run(&job, &FakeProvider::new(), &CancelFlag::new());

        match &events[0] {
            PipelineEvent::AudioInfo(info) => {
                assert_eq!(info.duration, 0.0);
                assert_eq!(info.sample_rate, 44100);
                assert_eq!(info.channels, 2);
                assert_eq!(info.format, "unknown");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert_eq!(kinds(&events).last().unwrap(), "result:false");
    }

    #[test]
    fn test_inference_failure_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let mut provider = FakeProvider::new();
        provider.fail_inference = true;
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass"]);
        let (_, events) = run(&job, &provider, &CancelFlag::new());

        let tail: Vec<String> = kinds(&events).into_iter().skip(7).collect();
        assert_eq!(tail, vec!["error_msg", "error", "result:false"]);
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_model_panic_becomes_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let mut provider = FakeProvider::new();
        provider.panic_on_infer = true;
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass"]);
        let (outcome, events) = run(&job, &provider, &CancelFlag::new());

        assert_eq!(
            kinds(&events),
            vec![
                "info", "p5", "loading_model", "p10", "device", "processing", "p15",
                "error_msg", "error", "result:false"
            ]
        );
        match outcome {
            JobOutcome::Failed(result) => {
                assert!(result.output_files.is_empty());
                assert_eq!(
                    result.error_message.as_deref(),
                    Some("Separation worker panicked: model exploded")
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_panicking_worker_still_sends_final_event() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let mut provider = FakeProvider::new();
        provider.panic_on_infer = true;
        let mut pipeline = SeparationPipeline::new(Arc::new(provider));
        let (tx, rx) = unbounded();
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass"]);
        pipeline.start(job, tx).unwrap();

        assert!(matches!(pipeline.join(), Some(JobOutcome::Failed(_))));
        let events = drain(&rx);
        assert!(matches!(events.last(), Some(PipelineEvent::Result(r)) if !r.success));
    }

    #[test]
    fn test_write_failure_keeps_earlier_stems() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);
        let folder = dir.path().join("a");
        // A directory where the second stem should go makes its rename fail
        std::fs::create_dir_all(folder.join("a - drums.wav")).unwrap();

        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass", "drums", "vocals"]);
        let (outcome, events) = run(&job, &FakeProvider::new(), &CancelFlag::new());

        let k = kinds(&events);
        assert_eq!(
            &k[k.len() - 5..],
            &["saving", "p86", "error_msg", "error", "result:false"]
        );
        match &events[events.len() - 3] {
            PipelineEvent::Error(msg) => {
                assert!(msg.starts_with("Failed to write stem file:"), "{}", msg)
            }
            other => panic!("unexpected event {:?}", other),
        }
        let result = outcome.result().unwrap();
        assert!(!result.success);
        assert!(result.output_files.is_empty());

        assert!(folder.join("a - bass.wav").is_file());
        assert!(!folder.join("a - vocals.wav").exists());
        assert!(!folder.join(".a - drums.wav.part").exists());
    }

    #[test]
    fn test_cancel_between_stem_writes_keeps_written_stems() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let cancel = CancelFlag::new();
        let events = std::cell::RefCell::new(Vec::new());
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass", "other", "vocals"]);
        let outcome = run_job_with(
            &job,
            &FakeProvider::new(),
            &OutputOptions::default(),
            &cancel,
            |event| {
                if matches!(&event, PipelineEvent::Progress(v) if *v > 80) {
                    cancel.cancel();
                }
                events.borrow_mut().push(event);
            },
        );

        assert_eq!(outcome, JobOutcome::Cancelled);
        let events = events.into_inner();
        let k = kinds(&events);
        assert_eq!(&k[k.len() - 3..], &["saving", "p86", "cancelled"]);
        assert!(events.iter().all(|e| !matches!(e, PipelineEvent::Result(_))));

        let folder = dir.path().join("a");
        assert!(folder.join("a - bass.wav").is_file());
        assert!(!folder.join("a - other.wav").exists());
        assert!(!folder.join("a - vocals.wav").exists());
        let leftovers: Vec<_> = std::fs::read_dir(&folder)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_cancel_before_inference() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let provider = FakeProvider::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass"]);
        let (outcome, events) = run(&job, &provider, &cancel);

        assert_eq!(outcome, JobOutcome::Cancelled);
        assert_eq!(kinds(&events).last().unwrap(), "cancelled");
        assert!(events.iter().all(|e| !matches!(e, PipelineEvent::Result(_))));
        assert_eq!(provider.counters.inferences.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_cancel_during_inference_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let cancel = CancelFlag::new();
        let mut provider = FakeProvider::new();
        provider.cancel_during_inference = Some(cancel.clone());
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["bass", "other"]);
        let (outcome, events) = run(&job, &provider, &cancel);

        assert_eq!(outcome, JobOutcome::Cancelled);
        assert_eq!(provider.counters.inferences.load(Ordering::SeqCst), 1);
        let k = kinds(&events);
        assert_eq!(&k[k.len() - 2..], &["p80".to_string(), "cancelled".to_string()]);
    }

    #[test]
    fn test_existing_output_folder_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Track.wav");
        write_fixture(&input, 2, 100);
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("Track")).unwrap();
        std::fs::write(out.join("Track").join("keep.txt"), b"x").unwrap();

        let job = ProcessingJob::new(&input, &out, "htdemucs", ["bass"]);
        let (outcome, _) = run(&job, &FakeProvider::new(), &CancelFlag::new());
        assert!(matches!(outcome, JobOutcome::Completed(_)));
        assert!(out.join("Track").join("keep.txt").exists());
        assert!(out.join("Track").join("Track - bass.wav").exists());
    }

    #[test]
    fn test_saving_progress_spreads_to_100() {
        assert_eq!(saving_progress(1, 1), 100);
        assert_eq!(saving_progress(1, 3), 86);
        assert_eq!(saving_progress(2, 3), 93);
        assert_eq!(saving_progress(3, 3), 100);
        assert_eq!(saving_progress(6, 6), 100);
    }

    #[test]
    fn test_pipeline_runs_on_worker_and_rejects_second_start() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let mut pipeline = SeparationPipeline::new(Arc::new(FakeProvider::new()));
        let (tx, rx) = unbounded();
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["drums"]);
        pipeline.start(job.clone(), tx.clone()).unwrap();
        assert!(matches!(
            pipeline.start(job, tx),
            Err(SeparationError::AlreadyStarted)
        ));

        let outcome = pipeline.join().unwrap();
        assert!(matches!(outcome, JobOutcome::Completed(_)));
        assert!(!pipeline.is_running());
        assert!(pipeline.join().is_none());

        let events = drain(&rx);
        assert!(events.last().unwrap().is_final());
    }

    #[test]
    fn test_disconnected_receiver_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.wav");
        write_fixture(&input, 2, 100);

        let (tx, rx) = unbounded();
        drop(rx);
        let job = ProcessingJob::new(&input, dir.path(), "htdemucs", ["drums"]);
        let outcome = run_job(
            &job,
            &FakeProvider::new(),
            &OutputOptions::default(),
            &CancelFlag::new(),
            &tx,
        );
        assert!(matches!(outcome, JobOutcome::Completed(_)));
    }
}
