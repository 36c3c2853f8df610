//! Audio probing, decoding (Symphonia) and stem WAV output (hound)

use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::error::{Result, SeparationError};
use super::job::AudioFileInfo;
use crate::types::{Waveform, DEFAULT_CHANNELS, UNKNOWN_FORMAT};

/// Sample encoding for written stem files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StemSampleFormat {
    /// 32-bit IEEE float, no clipping
    #[default]
    Float32,
    /// 16-bit PCM, clipped to [-1, 1]
    Pcm16,
}

/// Decoded input audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Planar samples, shape `[channels, samples]`
    pub waveform: Waveform,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn channels(&self) -> usize {
        self.waveform.nrows()
    }

    pub fn frames(&self) -> usize {
        self.waveform.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Open `path` and probe its container
fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path).map_err(|e| SeparationError::AudioReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SeparationError::UnsupportedFormat(e.to_string()))?;

    Ok(probed.format)
}

/// Container name derived from the file extension, e.g. "FLAC"
fn container_name(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_uppercase())
        .unwrap_or_else(|| UNKNOWN_FORMAT.to_string())
}

/// Read duration, sample rate, channel count and container of `path`
///
/// Only the container headers are read; no audio is decoded.
pub fn probe_audio_info(path: &Path) -> Result<AudioFileInfo> {
    let format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SeparationError::UnsupportedFormat("No audio track found".to_string()))?;

    let params = &track.codec_params;
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| SeparationError::UnsupportedFormat("Unknown sample rate".to_string()))?;
    let channels = params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(DEFAULT_CHANNELS);
    let duration = params
        .n_frames
        .map(|frames| frames as f64 / sample_rate as f64)
        .unwrap_or(0.0);

    Ok(AudioFileInfo {
        path: path.to_path_buf(),
        duration,
        sample_rate,
        channels,
        format: container_name(path),
    })
}

/// Probe `path`, substituting default metadata when probing fails
///
/// Metadata is advisory, so a broken header never fails a job here.
pub fn probe_or_default(path: &Path) -> AudioFileInfo {
    match probe_audio_info(path) {
        Ok(info) => info,
        Err(e) => {
            log::warn!(
                "probe_or_default: Could not probe {:?} ({}), using default metadata",
                path,
                e
            );
            AudioFileInfo::fallback(path)
        }
    }
}

/// Decode the whole file into planar samples
///
/// Mono input stays single-channel (`[1, samples]`). No resampling or channel
/// mixing is done here.
pub fn load_waveform(path: &Path) -> Result<DecodedAudio> {
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SeparationError::UnsupportedFormat("No audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SeparationError::UnsupportedFormat("Unknown sample rate".to_string()))?;
    // Unknown upfront for some codecs (e.g. AAC/M4A); taken from the first packet
    let mut channels: Option<usize> = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SeparationError::UnsupportedFormat(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(SeparationError::DecodeFailed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("load_waveform: Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(SeparationError::DecodeFailed(e.to_string())),
        };

        let spec = *decoded.spec();
        if channels.is_none() {
            channels = Some(spec.channels.count());
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    let channels = channels.unwrap_or(DEFAULT_CHANNELS as usize).max(1);
    if interleaved.is_empty() {
        return Err(SeparationError::DecodeFailed(format!(
            "No audio samples decoded from {}",
            path.display()
        )));
    }

    let frames = interleaved.len() / channels;
    let waveform = Array2::from_shape_fn((channels, frames), |(c, i)| interleaved[i * channels + c]);

    log::debug!(
        "load_waveform: {:?} -> {} channel(s), {} frames @ {} Hz",
        path,
        channels,
        frames,
        sample_rate
    );

    Ok(DecodedAudio {
        waveform,
        sample_rate,
    })
}

/// Deletes a temp file on drop unless disarmed
struct TempFileGuard {
    path: PathBuf,
    disarmed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, disarmed: false }
    }

    fn disarm(&mut self) {
        self.disarmed = true;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.disarmed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to cleanup temp file {:?}: {}", self.path, e);
                }
            }
        }
    }
}

fn hound_to_io(e: hound::Error) -> std::io::Error {
    match e {
        hound::Error::IoError(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

/// Write one stem (`[channels, samples]`) as a WAV file
///
/// The stem is encoded into a hidden sibling file that is renamed into place
/// after `finalize` succeeds, so `path` never holds a partial encode.
pub fn write_stem_wav(
    path: &Path,
    samples: ArrayView2<'_, f32>,
    sample_rate: u32,
    format: StemSampleFormat,
) -> Result<()> {
    let write_error = |source: std::io::Error| SeparationError::StemWriteError {
        path: path.to_path_buf(),
        source,
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.part", file_name));
    let mut guard = TempFileGuard::new(temp_path.clone());

    let channels = samples.nrows();
    let spec = match format {
        StemSampleFormat::Float32 => hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
        StemSampleFormat::Pcm16 => hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
    };

    let mut writer =
        hound::WavWriter::create(&temp_path, spec).map_err(|e| write_error(hound_to_io(e)))?;

    for frame in samples.columns() {
        for &sample in frame.iter() {
            let written = match format {
                StemSampleFormat::Float32 => writer.write_sample(sample),
                StemSampleFormat::Pcm16 => {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                }
            };
            written.map_err(|e| write_error(hound_to_io(e)))?;
        }
    }

    writer.finalize().map_err(|e| write_error(hound_to_io(e)))?;
    std::fs::rename(&temp_path, path).map_err(write_error)?;
    guard.disarm();

    Ok(())
}
