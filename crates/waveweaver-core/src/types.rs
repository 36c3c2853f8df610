//! Common types and constants for Waveweaver

use ndarray::{Array2, Array3};

/// Sample rate reported when an input file cannot be probed
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Channel count reported when an input file cannot be probed
pub const DEFAULT_CHANNELS: u16 = 2;

/// Container format reported when an input file cannot be probed
pub const UNKNOWN_FORMAT: &str = "unknown";

/// Maximum characters of the input base name kept in stem file names
pub const DEFAULT_MAX_NAME_LENGTH: usize = 25;

/// Input extensions accepted by the front-ends (lowercase, without dot)
pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "flac", "m4a", "ogg"];

/// Planar audio, shape `[channels, samples]`
pub type Waveform = Array2<f32>;

/// Separated sources, shape `[stems, channels, samples]`
pub type Sources = Array3<f32>;
