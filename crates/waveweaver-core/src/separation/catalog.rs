//! Static catalog of the separation models the pipeline knows about
//!
//! The table is fixed at compile time and never mutated. Stem order matches
//! the order of the model's output tensor, so a stem's position in
//! [`ModelDescriptor::stems`] is its index along the first output axis.

use super::error::{Result, SeparationError};

/// Catalog entry for one pretrained separation model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Identifier used on the command line and in config files
    pub key: &'static str,
    /// Short human-readable name
    pub name: &'static str,
    /// One-line description for model pickers
    pub description: &'static str,
    /// Ordered stem vocabulary produced by the model
    pub stems: &'static [&'static str],
}

const FOUR_STEMS: &[&str] = &["drums", "bass", "other", "vocals"];
const SIX_STEMS: &[&str] = &["drums", "bass", "other", "vocals", "piano", "guitar"];

pub const HTDEMUCS: ModelDescriptor = ModelDescriptor {
    key: "htdemucs",
    name: "HTDemucs",
    description: "High quality separation with balanced performance",
    stems: FOUR_STEMS,
};

pub const HTDEMUCS_FT: ModelDescriptor = ModelDescriptor {
    key: "htdemucs_ft",
    name: "HTDemucs Fine-tuned",
    description: "Fine-tuned version with better vocals separation",
    stems: FOUR_STEMS,
};

pub const MDX_EXTRA: ModelDescriptor = ModelDescriptor {
    key: "mdx_extra",
    name: "MDX-Extra",
    description: "High quality separation optimized for vocals",
    stems: FOUR_STEMS,
};

pub const MDX_EXTRA_Q: ModelDescriptor = ModelDescriptor {
    key: "mdx_extra_q",
    name: "MDX-Extra-Q",
    description: "Quantized version of MDX-Extra, faster but slightly lower quality",
    stems: FOUR_STEMS,
};

pub const HTDEMUCS_6S: ModelDescriptor = ModelDescriptor {
    key: "htdemucs_6s",
    name: "HTDemucs 6 Stems",
    description: "Separates into 6 stems including piano and guitar",
    stems: SIX_STEMS,
};

/// Every model, in display order
pub const ALL_MODELS: &[ModelDescriptor] =
    &[HTDEMUCS, HTDEMUCS_FT, MDX_EXTRA, MDX_EXTRA_Q, HTDEMUCS_6S];

/// Look up a model by key
pub fn find(key: &str) -> Option<&'static ModelDescriptor> {
    ALL_MODELS.iter().find(|m| m.key == key)
}

/// Look up a model by key, failing with [`SeparationError::ModelNotFound`]
pub fn resolve(key: &str) -> Result<&'static ModelDescriptor> {
    find(key).ok_or_else(|| SeparationError::ModelNotFound(key.to_string()))
}

/// All catalog entries
pub fn all() -> &'static [ModelDescriptor] {
    ALL_MODELS
}

/// All model keys, in display order
pub fn keys() -> Vec<&'static str> {
    ALL_MODELS.iter().map(|m| m.key).collect()
}

impl ModelDescriptor {
    /// Formatted name for pickers: `"<name> - <description>"`
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.name, self.description)
    }

    /// Position of `stem` in the output tensor
    pub fn stem_index(&self, stem: &str) -> Option<usize> {
        self.stems.iter().position(|s| *s == stem)
    }

    /// Position of `stem`, failing with [`SeparationError::StemNotFound`]
    pub fn require_stem(&self, stem: &str) -> Result<usize> {
        self.stem_index(stem).ok_or_else(|| SeparationError::StemNotFound {
            stem: stem.to_string(),
            model: self.key.to_string(),
        })
    }

    /// Check that every requested stem is in the vocabulary
    pub fn validate_stems<S: AsRef<str>>(&self, stems: &[S]) -> Result<()> {
        for stem in stems {
            self.require_stem(stem.as_ref())?;
        }
        Ok(())
    }

    /// Number of stems the model produces
    pub fn stem_count(&self) -> usize {
        self.stems.len()
    }

    /// Cached ONNX weights file name
    pub fn weights_filename(&self) -> String {
        format!("{}.onnx", self.key)
    }
}
