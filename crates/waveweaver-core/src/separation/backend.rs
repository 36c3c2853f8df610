//! Model provider traits and the ONNX Runtime implementation
//!
//! The pipeline only sees [`ModelProvider`] and [`SeparationModel`], so tests
//! and alternative runtimes can be swapped in without touching the stage
//! logic.
//!
//! ## Tensor layout
//!
//! The exported Demucs networks take `[1, 2, samples]` and return
//! `[1, stems, 2, samples]`, with stems in catalog order.

use std::fmt;
use std::path::Path;

use ndarray::{concatenate, s, Array2, Array3, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::catalog::ModelDescriptor;
use super::error::{Result, SeparationError};
use super::model::ModelManager;
use crate::types::{Sources, Waveform, DEFAULT_SAMPLE_RATE};

/// Longest random offset used by the shift trick, in seconds
const MAX_SHIFT_SECS: f64 = 0.5;

/// Compute device a provider runs inference on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    Gpu { name: String },
}

impl ExecutionDevice {
    pub fn is_accelerated(&self) -> bool {
        matches!(self, Self::Gpu { .. })
    }
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("CPU"),
            Self::Gpu { name } => write!(f, "GPU - {}", name),
        }
    }
}

/// A loaded, ready-to-run separation network
pub trait SeparationModel: Send {
    /// Separate `[channels, samples]` into `[stems, channels, samples]`
    ///
    /// Stems come back in the descriptor's vocabulary order.
    fn infer(&mut self, waveform: &Waveform) -> Result<Sources>;
}

/// Source of separation models
///
/// Loading may be slow (weights download, session build); the pipeline calls
/// it from its worker thread.
pub trait ModelProvider: Send + Sync {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn SeparationModel>>;

    /// Device inference will run on, reported before processing starts
    fn device(&self) -> ExecutionDevice;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel and shift helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Adapt any channel layout to the stereo input the networks expect
///
/// Mono is duplicated; extra channels beyond the first two are dropped.
pub fn to_stereo(waveform: &Waveform) -> Waveform {
    match waveform.nrows() {
        0 => Array2::zeros((2, waveform.ncols())),
        1 => concatenate(Axis(0), &[waveform.view(), waveform.view()])
            .unwrap_or_else(|_| Array2::zeros((2, waveform.ncols()))),
        2 => waveform.clone(),
        _ => waveform.slice(s![0..2, ..]).to_owned(),
    }
}

/// Run `run` on `shifts` randomly delayed copies of `waveform` and average
///
/// Each pass prepends up to `max_shift` samples of silence, runs the network
/// and crops the result back into alignment. `shifts == 0` is one plain pass.
pub fn apply_shifts<R, F>(
    waveform: &Waveform,
    shifts: u32,
    max_shift: usize,
    rng: &mut R,
    mut run: F,
) -> Result<Sources>
where
    R: Rng,
    F: FnMut(&Waveform) -> Result<Sources>,
{
    if shifts == 0 || max_shift == 0 {
        return run(waveform);
    }

    let (channels, length) = waveform.dim();
    let mut sum: Option<Sources> = None;

    for pass in 0..shifts {
        let offset = rng.gen_range(0..=max_shift);
        let mut padded = Array2::<f32>::zeros((channels, length + offset));
        padded.slice_mut(s![.., offset..]).assign(waveform);

        let out = run(&padded)?;
        if out.len_of(Axis(2)) < offset + length {
            return Err(SeparationError::InferenceFailed(format!(
                "Output too short on shift pass {}: {} < {}",
                pass,
                out.len_of(Axis(2)),
                offset + length
            )));
        }
        let aligned = out.slice(s![.., .., offset..offset + length]);

        match sum.as_mut() {
            Some(total) => *total += &aligned,
            None => sum = Some(aligned.to_owned()),
        }
    }

    let mut averaged = sum.unwrap_or_else(|| Array3::zeros((0, channels, length)));
    averaged /= shifts as f32;
    Ok(averaged)
}

// ─────────────────────────────────────────────────────────────────────────────
// ONNX Runtime provider
// ─────────────────────────────────────────────────────────────────────────────

/// Provider backed by ONNX Runtime via the `ort` crate
///
/// Weights are resolved through [`ModelManager`]. When compiled with the
/// `cuda` feature and a CUDA runtime is present, sessions use the CUDA
/// execution provider; otherwise they run on CPU.
pub struct OrtProvider {
    manager: ModelManager,
    shifts: u32,
    device: ExecutionDevice,
}

impl OrtProvider {
    pub fn new(manager: ModelManager, shifts: u32) -> Self {
        let device = Self::probe_device();
        log::info!("OrtProvider: Using {} with {} shift(s)", device, shifts);
        Self {
            manager,
            shifts,
            device,
        }
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    fn probe_device() -> ExecutionDevice {
        #[cfg(feature = "cuda")]
        {
            use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
            match CUDAExecutionProvider::default().is_available() {
                Ok(true) => {
                    return ExecutionDevice::Gpu {
                        name: "CUDA".to_string(),
                    }
                }
                Ok(false) => log::info!("probe_device: CUDA runtime not available, using CPU"),
                Err(e) => log::warn!("probe_device: CUDA probe failed: {}", e),
            }
        }
        ExecutionDevice::Cpu
    }

    fn build_session(&self, model_path: &Path) -> Result<ort::session::Session> {
        use ort::session::{builder::GraphOptimizationLevel, Session};

        log::info!("build_session: Loading ONNX model from {:?}", model_path);

        let builder = Session::builder()
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?;

        #[cfg(feature = "cuda")]
        let builder = if self.device.is_accelerated() {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?
        } else {
            builder
        };

        builder.commit_from_file(model_path).map_err(|e| {
            SeparationError::BackendInitFailed(format!("Failed to load ONNX model: {}", e))
        })
    }
}

impl ModelProvider for OrtProvider {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<Box<dyn SeparationModel>> {
        let key = descriptor.key;
        let model_path = self.manager.ensure_model(
            descriptor,
            Some(Box::new(move |p| {
                log::debug!("load: {} weights {:.0}%", key, p * 100.0)
            })),
        )?;

        let session = self.build_session(&model_path)?;

        Ok(Box::new(OrtModel {
            session,
            stem_count: descriptor.stem_count(),
            shifts: self.shifts,
            rng: StdRng::from_entropy(),
        }))
    }

    fn device(&self) -> ExecutionDevice {
        self.device.clone()
    }

    fn name(&self) -> &'static str {
        "ONNX Runtime"
    }
}

/// One ONNX Runtime session for one catalog model
struct OrtModel {
    session: ort::session::Session,
    stem_count: usize,
    shifts: u32,
    rng: StdRng,
}

impl OrtModel {
    /// Single forward pass over a stereo `[2, samples]` waveform
    fn run_once(&mut self, stereo: &Waveform) -> Result<Sources> {
        use ort::value::Tensor;

        let samples = stereo.ncols();
        let input = stereo.clone().insert_axis(Axis(0));

        log::debug!("run_once: Running inference on {} samples", samples);

        let input_tensor = Tensor::from_array(input).map_err(|e| {
            SeparationError::InferenceFailed(format!("Failed to create input tensor: {}", e))
        })?;

        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .map_err(|e| SeparationError::InferenceFailed(format!("Inference failed: {}", e)))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| SeparationError::InferenceFailed("No output tensor".to_string()))?
            .1;

        let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
            SeparationError::InferenceFailed(format!("Failed to extract output: {}", e))
        })?;

        let output_shape: Vec<i64> = shape.iter().copied().collect();
        if output_shape.len() != 4 || output_shape[1] as usize != self.stem_count {
            return Err(SeparationError::InferenceFailed(format!(
                "Unexpected output shape: {:?}, expected [1, {}, 2, N]",
                output_shape, self.stem_count
            )));
        }

        let dims = (
            output_shape[1] as usize,
            output_shape[2] as usize,
            output_shape[3] as usize,
        );
        let sources = ArrayView3::from_shape(dims, data)
            .map_err(|e| SeparationError::InferenceFailed(e.to_string()))?
            .to_owned();

        Ok(sources)
    }
}

impl SeparationModel for OrtModel {
    fn infer(&mut self, waveform: &Waveform) -> Result<Sources> {
        if waveform.nrows() != 2 {
            log::debug!(
                "infer: Adapting {} channel(s) to stereo for the network",
                waveform.nrows()
            );
        }
        let stereo = to_stereo(waveform);
        let max_shift = (MAX_SHIFT_SECS * DEFAULT_SAMPLE_RATE as f64) as usize;

        let shifts = self.shifts;
        let mut rng = self.rng.clone();
        let result = apply_shifts(&stereo, shifts, max_shift, &mut rng, |chunk| {
            self.run_once(chunk)
        });
        self.rng = rng;
        result
    }
}
