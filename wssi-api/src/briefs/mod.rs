//! Fragility Brief: composition, rendering and the release archive

pub mod archive;
pub mod model;
pub mod render;

pub use archive::{BriefArchive, BriefReadiness, PublishOutcome, PublishRequest};
pub use model::{BriefDocument, Variant};
