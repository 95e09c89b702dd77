//! Asynchronous 3D asset generation: service abstraction and the
//! single-slot request pipeline.

pub mod pipeline;
pub mod service;

pub use pipeline::{
    ArtifactPlaceholder, CollectingPlaceholder, CollectingPlaceholderFactory, CompletionHandle,
    GenerationOutcome, GenerationPipeline, PlaceholderCall, PlaceholderFactory,
};
pub use service::{
    AssetFormat, AssetRequest, GenerationService, MeshAsset, MockGenerationService, Stage,
    StageEvent, TextureAsset,
};
