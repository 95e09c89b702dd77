//! Single-slot generation request pipeline.
//!
//! Exactly one generation request may be outstanding at a time: `submit` is
//! an admission check, not a queue. Each admitted request runs on its own
//! worker thread, consuming the service's stage events in order, updating
//! the owning placeholder, and resolving a single-resolution completion
//! handle when the request reaches a terminal stage. Releasing the slot is
//! idempotent, so duplicate or late terminal events cannot wedge admission.

use crate::config::GenerationConfig;
use crate::error::{LensliveError, Result};
use crate::generation::service::{
    AssetFormat, AssetRequest, GenerationService, MeshAsset, Stage, StageEvent, TextureAsset,
};
use crate::protocol::{FunctionDeclaration, ToolDeclaration};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Trait for the visual placeholder owning one generation request.
///
/// The host instantiates a scene object per request; the pipeline only talks
/// to it through this trait.
pub trait ArtifactPlaceholder: Send + Sync {
    /// Show the prompt while generation is pending.
    fn set_prompt(&self, prompt: &str);

    /// Attach the 2D preview produced at the image stage.
    fn set_preview(&self, texture: &TextureAsset);

    /// Attach a mesh; `refined` distinguishes the provisional base mesh from
    /// the final asset.
    fn set_model(&self, mesh: &MeshAsset, refined: bool);

    /// Render an error state after a submission failure.
    fn on_failure(&self, message: &str);
}

/// Trait for creating placeholders, one per admitted request.
pub trait PlaceholderFactory: Send + Sync {
    fn create(&self, prompt: &str) -> Arc<dyn ArtifactPlaceholder>;
}

/// Successful completion descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub prompt: String,
    pub message: String,
}

/// Single-resolution handle for one generation request.
///
/// Resolves with a [`GenerationOutcome`] on success or a [`LensliveError`]
/// on failure, exactly once.
pub struct CompletionHandle {
    rx: Receiver<Result<GenerationOutcome>>,
}

impl CompletionHandle {
    /// Block until the request resolves.
    pub fn wait(&self) -> Result<GenerationOutcome> {
        self.rx.recv().map_err(|_| {
            LensliveError::Other("generation worker dropped without resolving".to_string())
        })?
    }

    /// Block up to `timeout` for resolution; `None` when still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<GenerationOutcome>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(LensliveError::Other(
                "generation worker dropped without resolving".to_string(),
            ))),
        }
    }

    /// Non-blocking check for resolution.
    pub fn try_result(&self) -> Option<Result<GenerationOutcome>> {
        self.rx.try_recv().ok()
    }
}

/// The single-slot asynchronous generation pipeline.
pub struct GenerationPipeline {
    service: Arc<dyn GenerationService>,
    placeholders: Arc<dyn PlaceholderFactory>,
    config: GenerationConfig,
    available: Arc<AtomicBool>,
}

impl GenerationPipeline {
    /// Function name the backend uses to route generation tool calls.
    pub const TOOL_NAME: &'static str = "Snap3D";

    pub fn new(
        service: Arc<dyn GenerationService>,
        placeholders: Arc<dyn PlaceholderFactory>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            service,
            placeholders,
            config,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the admission slot is free.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// The function declaration to register at session setup.
    pub fn tool_declaration() -> ToolDeclaration {
        ToolDeclaration {
            function_declarations: vec![FunctionDeclaration {
                name: Self::TOOL_NAME.to_string(),
                description: "Generates a 3D model based on a text prompt".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {
                            "type": "string",
                            "description": "The text prompt to generate a 3D model from. \
                                Cartoonish styles work best. Use 'full body' when \
                                generating characters.",
                        }
                    },
                    "required": ["prompt"],
                }),
            }],
        }
    }

    /// Admit one generation request.
    ///
    /// Fails immediately with [`LensliveError::GenerationBusy`] while a
    /// request is outstanding; the outstanding request is untouched. On
    /// admission the slot is occupied, a placeholder is created for the
    /// prompt, and the request runs on a worker thread. The returned handle
    /// resolves once, at `refined_mesh` or on failure; either way the slot
    /// is free again by the time the handle resolves.
    pub fn submit(&self, prompt: &str) -> Result<CompletionHandle> {
        if self
            .available
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LensliveError::GenerationBusy);
        }

        let placeholder = self.placeholders.create(prompt);
        placeholder.set_prompt(prompt);

        let request = AssetRequest {
            prompt: prompt.to_string(),
            format: AssetFormat::Glb,
            refine: self.config.refine,
            use_vertex_color: self.config.use_vertex_color,
        };

        let (result_tx, result_rx) = bounded(1);
        let service = Arc::clone(&self.service);
        let available = Arc::clone(&self.available);
        let stage_timeout_ms = self.config.stage_timeout_ms;

        thread::spawn(move || {
            run_request(
                service,
                request,
                placeholder,
                available,
                stage_timeout_ms,
                result_tx,
            );
        });

        Ok(CompletionHandle { rx: result_rx })
    }
}

fn run_request(
    service: Arc<dyn GenerationService>,
    request: AssetRequest,
    placeholder: Arc<dyn ArtifactPlaceholder>,
    available: Arc<AtomicBool>,
    stage_timeout_ms: u64,
    result_tx: Sender<Result<GenerationOutcome>>,
) {
    let prompt = request.prompt.clone();

    let release = |result: Result<GenerationOutcome>| {
        // Release before resolving so a caller woken by the handle can
        // submit again immediately. store() keeps the release idempotent.
        available.store(true, Ordering::SeqCst);
        let _ = result_tx.send(result);
    };

    let stage_rx = match service.submit(&request) {
        Ok(stage_rx) => stage_rx,
        Err(e) => {
            // Submission failure is the one path that must also reach the
            // placeholder, so it can render an error state.
            let message = e.to_string();
            placeholder.on_failure(&message);
            release(Err(LensliveError::GenerationFailed { prompt, message }));
            return;
        }
    };

    let mut current = Stage::Submitted;
    loop {
        let event = if stage_timeout_ms > 0 {
            stage_rx.recv_timeout(Duration::from_millis(stage_timeout_ms))
        } else {
            stage_rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        };

        match event {
            Ok(event) => {
                let stage = event.stage();
                // Stages only advance; duplicates and regressions are dropped.
                if stage != Stage::Failed && stage <= current {
                    continue;
                }
                match event {
                    StageEvent::Image(texture) => {
                        placeholder.set_preview(&texture);
                        current = Stage::Image;
                    }
                    StageEvent::BaseMesh(mesh) => {
                        placeholder.set_model(&mesh, false);
                        current = Stage::BaseMesh;
                    }
                    StageEvent::RefinedMesh(mesh) => {
                        placeholder.set_model(&mesh, true);
                        let message = format!("Successfully created mesh: {}", prompt);
                        release(Ok(GenerationOutcome { prompt, message }));
                        return;
                    }
                    StageEvent::Failed { message } => {
                        release(Err(LensliveError::GenerationFailed { prompt, message }));
                        return;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                release(Err(LensliveError::GenerationStalled {
                    stage: current.as_str().to_string(),
                    waited_ms: stage_timeout_ms,
                }));
                return;
            }
            Err(RecvTimeoutError::Disconnected) => {
                release(Err(LensliveError::GenerationFailed {
                    prompt,
                    message: "generation service dropped the request stream".to_string(),
                }));
                return;
            }
        }
    }
}

/// Placeholder interaction, recorded for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceholderCall {
    Prompt(String),
    Preview,
    Model { refined: bool },
    Failure(String),
}

/// Mock placeholder for testing
#[derive(Default)]
pub struct CollectingPlaceholder {
    calls: Mutex<Vec<PlaceholderCall>>,
}

impl CollectingPlaceholder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PlaceholderCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: PlaceholderCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl ArtifactPlaceholder for CollectingPlaceholder {
    fn set_prompt(&self, prompt: &str) {
        self.record(PlaceholderCall::Prompt(prompt.to_string()));
    }

    fn set_preview(&self, _texture: &TextureAsset) {
        self.record(PlaceholderCall::Preview);
    }

    fn set_model(&self, _mesh: &MeshAsset, refined: bool) {
        self.record(PlaceholderCall::Model { refined });
    }

    fn on_failure(&self, message: &str) {
        self.record(PlaceholderCall::Failure(message.to_string()));
    }
}

/// Mock factory handing out [`CollectingPlaceholder`]s and keeping them
/// reachable for assertions.
#[derive(Default)]
pub struct CollectingPlaceholderFactory {
    created: Mutex<Vec<Arc<CollectingPlaceholder>>>,
}

impl CollectingPlaceholderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<Arc<CollectingPlaceholder>> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl PlaceholderFactory for CollectingPlaceholderFactory {
    fn create(&self, _prompt: &str) -> Arc<dyn ArtifactPlaceholder> {
        let placeholder = Arc::new(CollectingPlaceholder::new());
        if let Ok(mut created) = self.created.lock() {
            created.push(Arc::clone(&placeholder));
        }
        placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::service::MockGenerationService;

    fn pipeline_with(
        service: MockGenerationService,
    ) -> (GenerationPipeline, Arc<CollectingPlaceholderFactory>) {
        let factory = Arc::new(CollectingPlaceholderFactory::new());
        let pipeline = GenerationPipeline::new(
            Arc::new(service),
            Arc::clone(&factory) as Arc<dyn PlaceholderFactory>,
            GenerationConfig::default(),
        );
        (pipeline, factory)
    }

    fn staged_success() -> Vec<StageEvent> {
        vec![
            StageEvent::Image(TextureAsset { data: vec![1] }),
            StageEvent::BaseMesh(MeshAsset { data: vec![2] }),
            StageEvent::RefinedMesh(MeshAsset { data: vec![3] }),
        ]
    }

    #[test]
    fn test_full_stage_run_resolves_once_and_frees_slot() {
        // Scenario 4: image → base_mesh → refined_mesh resolves the handle
        // exactly once, with the slot free immediately after.
        let (pipeline, factory) =
            pipeline_with(MockGenerationService::new().with_stages(staged_success()));

        let handle = pipeline.submit("dunce cap").unwrap();
        let outcome = handle.wait().unwrap();

        assert_eq!(outcome.prompt, "dunce cap");
        assert!(outcome.message.contains("dunce cap"));
        assert!(pipeline.is_available());

        // Single resolution: the handle yields nothing further
        assert!(handle.try_result().is_none());

        let placeholders = factory.created();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(
            placeholders[0].calls(),
            vec![
                PlaceholderCall::Prompt("dunce cap".to_string()),
                PlaceholderCall::Preview,
                PlaceholderCall::Model { refined: false },
                PlaceholderCall::Model { refined: true },
            ]
        );
    }

    #[test]
    fn test_submit_while_busy_is_rejected_without_side_effects() {
        // Scenario 5: a second submit while the first is in flight fails
        // immediately and leaves the first request untouched.
        let service = Arc::new(MockGenerationService::new().with_manual_stages());
        let factory = Arc::new(CollectingPlaceholderFactory::new());
        let pipeline = GenerationPipeline::new(
            Arc::clone(&service) as Arc<dyn GenerationService>,
            Arc::clone(&factory) as Arc<dyn PlaceholderFactory>,
            GenerationConfig::default(),
        );

        let first = pipeline.submit("a").unwrap();
        // Wait for the worker to reach the service
        let stage_tx = loop {
            if let Some(tx) = service.stage_sender() {
                break tx;
            }
            thread::sleep(Duration::from_millis(5));
        };

        let second = pipeline.submit("b");
        assert!(matches!(second, Err(LensliveError::GenerationBusy)));
        assert_eq!(factory.created().len(), 1, "no placeholder for b");

        // First request completes unaffected
        stage_tx
            .send(StageEvent::RefinedMesh(MeshAsset { data: vec![] }))
            .unwrap();
        assert!(first.wait().is_ok());
        assert!(pipeline.is_available());
    }

    #[test]
    fn test_slot_free_after_failure_stage() {
        let (pipeline, factory) = pipeline_with(MockGenerationService::new().with_stages(vec![
            StageEvent::Image(TextureAsset { data: vec![] }),
            StageEvent::Failed {
                message: "mesh generation error".to_string(),
            },
        ]));

        let handle = pipeline.submit("wig").unwrap();
        let result = handle.wait();

        match result {
            Err(LensliveError::GenerationFailed { prompt, message }) => {
                assert_eq!(prompt, "wig");
                assert_eq!(message, "mesh generation error");
            }
            other => panic!("Expected GenerationFailed, got {:?}", other),
        }
        assert!(pipeline.is_available());

        // Stage failure does not render the placeholder error state; that is
        // reserved for submission failures.
        let calls = factory.created()[0].calls();
        assert!(!calls.iter().any(|c| matches!(c, PlaceholderCall::Failure(_))));

        // The freed slot admits a new request
        assert!(pipeline.submit("again").is_ok());
    }

    #[test]
    fn test_submission_failure_notifies_placeholder_and_frees_slot() {
        let (pipeline, factory) =
            pipeline_with(MockGenerationService::new().with_submit_failure("service unavailable"));

        let handle = pipeline.submit("hat").unwrap();
        let result = handle.wait();
        assert!(matches!(
            result,
            Err(LensliveError::GenerationFailed { .. })
        ));
        assert!(pipeline.is_available());

        let calls = factory.created()[0].calls();
        assert!(
            calls
                .iter()
                .any(|c| matches!(c, PlaceholderCall::Failure(m) if m.contains("service unavailable")))
        );
    }

    #[test]
    fn test_duplicate_and_regressed_stages_are_dropped() {
        let (pipeline, factory) = pipeline_with(MockGenerationService::new().with_stages(vec![
            StageEvent::Image(TextureAsset { data: vec![] }),
            StageEvent::Image(TextureAsset { data: vec![] }),
            StageEvent::BaseMesh(MeshAsset { data: vec![] }),
            StageEvent::Image(TextureAsset { data: vec![] }),
            StageEvent::RefinedMesh(MeshAsset { data: vec![] }),
        ]));

        let handle = pipeline.submit("wig").unwrap();
        handle.wait().unwrap();

        assert_eq!(
            factory.created()[0].calls(),
            vec![
                PlaceholderCall::Prompt("wig".to_string()),
                PlaceholderCall::Preview,
                PlaceholderCall::Model { refined: false },
                PlaceholderCall::Model { refined: true },
            ]
        );
    }

    #[test]
    fn test_disconnected_stream_without_terminal_is_failure() {
        // Scripted mock drops the sender after playback; no terminal event
        let (pipeline, _factory) = pipeline_with(
            MockGenerationService::new()
                .with_stages(vec![StageEvent::Image(TextureAsset { data: vec![] })]),
        );

        let handle = pipeline.submit("wig").unwrap();
        let result = handle.wait();
        match result {
            Err(LensliveError::GenerationFailed { message, .. }) => {
                assert!(message.contains("dropped"));
            }
            other => panic!("Expected GenerationFailed, got {:?}", other),
        }
        assert!(pipeline.is_available());
    }

    #[test]
    fn test_stalled_stage_times_out_and_frees_slot() {
        let service = MockGenerationService::new().with_manual_stages();
        let factory = Arc::new(CollectingPlaceholderFactory::new());
        let config = GenerationConfig {
            stage_timeout_ms: 50,
            ..Default::default()
        };
        let pipeline = GenerationPipeline::new(
            Arc::new(service),
            factory as Arc<dyn PlaceholderFactory>,
            config,
        );

        let handle = pipeline.submit("slow hat").unwrap();
        let result = handle.wait();
        match result {
            Err(LensliveError::GenerationStalled { stage, waited_ms }) => {
                assert_eq!(stage, "submitted");
                assert_eq!(waited_ms, 50);
            }
            other => panic!("Expected GenerationStalled, got {:?}", other),
        }
        assert!(pipeline.is_available());
    }

    #[test]
    fn test_tool_declaration_shape() {
        let declaration = GenerationPipeline::tool_declaration();
        assert_eq!(declaration.function_declarations.len(), 1);

        let function = &declaration.function_declarations[0];
        assert_eq!(function.name, "Snap3D");
        assert_eq!(
            function.parameters["required"],
            serde_json::json!(["prompt"])
        );
        assert_eq!(function.parameters["properties"]["prompt"]["type"], "string");
    }

    #[test]
    fn test_wait_timeout_reports_pending() {
        let service = MockGenerationService::new().with_manual_stages();
        let factory = Arc::new(CollectingPlaceholderFactory::new());
        let pipeline = GenerationPipeline::new(
            Arc::new(service),
            factory as Arc<dyn PlaceholderFactory>,
            GenerationConfig::default(),
        );

        let handle = pipeline.submit("pending hat").unwrap();
        assert!(handle.wait_timeout(Duration::from_millis(50)).is_none());
    }
}
