//! Generation service abstraction and its staged progress vocabulary.

use crate::error::{LensliveError, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Checkpoints of one generation request, in progress order.
///
/// The derived ordering is the progress ordering; `Failed` sorts last but is
/// reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Submitted,
    Image,
    BaseMesh,
    RefinedMesh,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Submitted => "submitted",
            Stage::Image => "image",
            Stage::BaseMesh => "base_mesh",
            Stage::RefinedMesh => "refined_mesh",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output format requested from the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Glb,
}

/// One generation request as submitted to the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRequest {
    pub prompt: String,
    pub format: AssetFormat,
    pub refine: bool,
    pub use_vertex_color: bool,
}

/// A preview texture produced at the `image` stage. Opaque host bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAsset {
    pub data: Vec<u8>,
}

/// A generated mesh, base or refined. Opaque host bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    pub data: Vec<u8>,
}

/// One progress event from the generation service.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Image(TextureAsset),
    BaseMesh(MeshAsset),
    RefinedMesh(MeshAsset),
    Failed { message: String },
}

impl StageEvent {
    pub fn stage(&self) -> Stage {
        match self {
            StageEvent::Image(_) => Stage::Image,
            StageEvent::BaseMesh(_) => Stage::BaseMesh,
            StageEvent::RefinedMesh(_) => Stage::RefinedMesh,
            StageEvent::Failed { .. } => Stage::Failed,
        }
    }
}

/// Trait for the asynchronous 3D generation backend.
///
/// This trait allows swapping implementations (real HTTP service vs mock).
/// A successful submit returns the request's ordered stage-event stream;
/// stage events arrive in non-decreasing stage order and end with
/// `RefinedMesh` or `Failed`.
pub trait GenerationService: Send + Sync {
    fn submit(&self, request: &AssetRequest) -> Result<Receiver<StageEvent>>;
}

/// Mock generation service for testing
pub struct MockGenerationService {
    scripted: Mutex<Vec<StageEvent>>,
    manual: bool,
    manual_tx: Mutex<Option<Sender<StageEvent>>>,
    submitted: Arc<Mutex<Vec<AssetRequest>>>,
    submit_error: Option<String>,
}

impl MockGenerationService {
    /// Create a mock that completes every request with an empty refined mesh.
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(vec![StageEvent::RefinedMesh(MeshAsset { data: Vec::new() })]),
            manual: false,
            manual_tx: Mutex::new(None),
            submitted: Arc::new(Mutex::new(Vec::new())),
            submit_error: None,
        }
    }

    /// Script the stage events played back for each request.
    pub fn with_stages(mut self, stages: Vec<StageEvent>) -> Self {
        self.scripted = Mutex::new(stages);
        self
    }

    /// Configure the mock to reject submission.
    pub fn with_submit_failure(mut self, message: &str) -> Self {
        self.submit_error = Some(message.to_string());
        self
    }

    /// Keep the stage sender open so the test delivers events by hand.
    pub fn with_manual_stages(mut self) -> Self {
        self.manual = true;
        self
    }

    /// Stage sender for the most recent manual-mode submit.
    pub fn stage_sender(&self) -> Option<Sender<StageEvent>> {
        self.manual_tx.lock().ok().and_then(|tx| tx.clone())
    }

    /// Shared handle to the submitted-request log.
    pub fn submitted_log(&self) -> Arc<Mutex<Vec<AssetRequest>>> {
        Arc::clone(&self.submitted)
    }
}

impl Default for MockGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationService for MockGenerationService {
    fn submit(&self, request: &AssetRequest) -> Result<Receiver<StageEvent>> {
        if let Some(message) = &self.submit_error {
            return Err(LensliveError::GenerationSubmit {
                message: message.clone(),
            });
        }
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(request.clone());
        }

        let (tx, rx) = unbounded();
        if self.manual {
            if let Ok(mut manual_tx) = self.manual_tx.lock() {
                *manual_tx = Some(tx);
            }
        } else if let Ok(scripted) = self.scripted.lock() {
            for event in scripted.iter() {
                let _ = tx.send(event.clone());
            }
        }
        Ok(rx)
    }
}
