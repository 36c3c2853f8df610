//! Output naming and small file helpers
//!
//! Stems for `In/My Song.mp3` land in `<output>/My Song/My Song - vocals.wav`.
//! Long base names are shortened at a word boundary so stem files stay
//! readable in file browsers.

use std::path::{Path, PathBuf};

use crate::types::SUPPORTED_AUDIO_EXTENSIONS;

/// Base name used when a path has no usable file stem
const FALLBACK_BASE_NAME: &str = "output";

/// Shorten `name` to at most `max_length` chars, preferring a word boundary
///
/// The cut falls back to a plain character cut when breaking at the last
/// space would keep less than half of `max_length`.
pub fn truncate_filename(name: &str, max_length: usize) -> String {
    if name.chars().count() <= max_length {
        return name.to_string();
    }

    let cut: String = name.chars().take(max_length).collect();
    let at_word = match cut.rfind(' ') {
        Some(idx) => &cut[..idx],
        None => cut.as_str(),
    };

    if at_word.chars().count() < max_length / 2 {
        cut
    } else {
        at_word.to_string()
    }
}

/// Shorten `text` by replacing its middle with `...`
pub fn truncate_middle(text: &str, max_length: usize) -> String {
    let len = text.chars().count();
    if len <= max_length {
        return text.to_string();
    }
    if max_length <= 3 {
        return text.chars().take(max_length).collect();
    }

    let each_side = (max_length - 3) / 2;
    let head: String = text.chars().take(each_side).collect();
    let tail: String = text.chars().skip(len - each_side).collect();
    format!("{}...{}", head, tail)
}

/// Strip everything except `-_.() `, ASCII letters and digits, then cap the
/// length while keeping the extension
pub fn create_safe_filename(filename: &str, max_length: usize) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "-_.() ".contains(*c))
        .collect();

    if safe.len() <= max_length {
        return safe;
    }

    let (stem, ext) = match safe.rfind('.') {
        Some(idx) if idx > 0 => safe.split_at(idx),
        _ => (safe.as_str(), ""),
    };
    let available = max_length.saturating_sub(ext.len());
    format!("{}{}", &stem[..available.min(stem.len())], ext)
}

/// Base name of an input file (file name without extension)
pub fn input_base_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string())
}

/// Per-input subfolder of the output directory
pub fn output_folder(output_dir: &Path, input: &Path) -> PathBuf {
    output_dir.join(input_base_name(input))
}

/// `"<truncated base> - <stem>.wav"`
pub fn stem_file_name(base_name: &str, stem: &str, max_length: usize) -> String {
    format!("{} - {}.wav", truncate_filename(base_name, max_length), stem)
}

/// Seconds as `M:SS`
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Bytes as a short human-readable size, e.g. `"1.5 MB"`
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// Whether the extension is one of the supported input formats
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Supported extension and an existing regular file
pub fn validate_audio_file(path: &Path) -> bool {
    path.is_file() && is_audio_file(path)
}
