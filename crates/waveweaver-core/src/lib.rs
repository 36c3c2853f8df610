//! Waveweaver Core - stem separation pipeline shared by the front-ends
//!
//! The crate has no dependency on any UI toolkit. A front-end builds a
//! [`separation::ProcessingJob`], hands it to a [`separation::SeparationPipeline`]
//! and renders the [`separation::PipelineEvent`]s that come back over a channel,
//! usually through a [`separation::JobMonitor`].

pub mod config;
pub mod separation;
pub mod types;

pub use types::*;
