//! Wiring between the assistant session and the generation pipeline.
//!
//! The bridge consumes session events on its own thread: generation tool
//! calls are admitted into the pipeline and answered with a tool response
//! once they resolve, and activation changes from the UI layer are mapped
//! onto capture streaming (plus an output interrupt on deactivation).
//! Handling one tool call never blocks the next — completion waits happen
//! on per-request threads.

use crate::generation::pipeline::GenerationPipeline;
use crate::session::assistant::{SessionController, SessionEvent};
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Connects session tool calls to the generation pipeline.
pub struct AssistantBridge {
    controller: SessionController,
    shutdown_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl AssistantBridge {
    /// Spawns the bridge loop over a session event subscription.
    pub fn spawn(
        events: Receiver<SessionEvent>,
        controller: SessionController,
        pipeline: Arc<GenerationPipeline>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = unbounded();
        let loop_controller = controller.clone();

        let thread = thread::spawn(move || {
            Self::run(events, shutdown_rx, loop_controller, pipeline);
        });

        Self {
            controller,
            shutdown_tx,
            thread: Some(thread),
        }
    }

    /// React to the UI layer's activation source: stream while active,
    /// silence any in-progress playback when deactivated.
    pub fn set_activation(&self, active: bool) {
        self.controller.set_streaming(active);
        if !active {
            self.controller.interrupt_output();
        }
    }

    /// Stops the bridge loop and joins its thread.
    pub fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            eprintln!("lenslive: bridge thread panicked");
        }
    }

    fn run(
        events: Receiver<SessionEvent>,
        shutdown_rx: Receiver<()>,
        controller: SessionController,
        pipeline: Arc<GenerationPipeline>,
    ) {
        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(SessionEvent::ToolCall { name, args, .. }) => {
                        Self::handle_tool_call(&controller, &pipeline, &name, &args);
                    }
                    // Speech and status events belong to the UI layer; other
                    // subscribers receive their own copies.
                    Ok(_) => {}
                    Err(_) => break,
                },
                recv(shutdown_rx) -> _ => break,
            }
        }
    }

    fn handle_tool_call(
        controller: &SessionController,
        pipeline: &Arc<GenerationPipeline>,
        name: &str,
        args: &serde_json::Value,
    ) {
        if name != GenerationPipeline::TOOL_NAME {
            eprintln!("lenslive: ignoring unhandled tool call: {name}");
            return;
        }

        let Some(prompt) = args.get("prompt").and_then(|v| v.as_str()) else {
            controller.send_tool_response(name, "Missing required argument: prompt");
            return;
        };

        match pipeline.submit(prompt) {
            Ok(handle) => {
                let controller = controller.clone();
                let name = name.to_string();
                // Wait out the request off-loop so later tool calls are not
                // held up behind this one.
                thread::spawn(move || {
                    let content = match handle.wait() {
                        Ok(outcome) => outcome.message,
                        Err(e) => e.to_string(),
                    };
                    controller.send_tool_response(&name, &content);
                });
            }
            Err(e) => {
                // Busy admission or submission failure: answer immediately
                controller.send_tool_response(name, &e.to_string());
            }
        }
    }
}
