//! Orchestrator: wiring and the dispatch loop
//!
//! Owns every long-lived component. Startup wires the queue, arbiter,
//! adapters, router, and brain together from config; the dispatch loop then
//! runs single-threaded: pop one input event, let the brain decide, fan the
//! decisions out. A shutdown event ends the loop, drains the output side,
//! and joins the workers.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::factory::{AdapterContext, AdapterFactory};
use crate::adapters::{InputAdapter, OutputAdapter};
use crate::audio::AudioArbiter;
use crate::brain::{Brain, BrainConfig};
use crate::cloud::HttpChatModel;
use crate::config::Config;
use crate::events::{EventKind, EventQueue};
use crate::router::EventRouter;
use crate::Result;

/// Dispatch loop poll period; also bounds shutdown latency when idle
const POP_TIMEOUT: Duration = Duration::from_secs(1);
/// How long shutdown waits for the speaker to finish the farewell
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Orchestrator {
    input_queue: Arc<EventQueue>,
    arbiter: Arc<AudioArbiter>,
    brain: Brain,
    router: EventRouter,
    inputs: Vec<Box<dyn InputAdapter>>,
    outputs: Vec<Box<dyn OutputAdapter>>,
}

impl Orchestrator {
    /// Wire everything from config.
    ///
    /// # Errors
    ///
    /// Returns an error if any adapter declaration or collaborator client
    /// fails to construct. Nothing is started yet on failure.
    pub fn from_config(config: Config) -> Result<Self> {
        let input_queue = Arc::new(EventQueue::bounded("input", config.queues.input_capacity));
        let arbiter = Arc::new(AudioArbiter::new("default"));

        let model = HttpChatModel::new(
            &config.brain.api_url,
            &config.api_key(),
            &config.brain.model,
            &config.brain.system_instruction,
            config.brain.temperature,
            config.brain.history_turns,
            config.request_timeout(),
        )?;
        let brain = Brain::new(
            Box::new(model),
            BrainConfig {
                fallback_reply: config.brain.fallback_reply.clone(),
                farewell: config.brain.farewell.clone(),
                hot_temperature_c: config.brain.hot_temperature_c,
            },
        );

        let ctx = AdapterContext {
            config,
            input_queue: Arc::clone(&input_queue),
            arbiter: Arc::clone(&arbiter),
        };
        let factory = AdapterFactory::with_builtins();
        let (inputs, outputs) = factory.build_all(&ctx)?;

        Ok(Self::assemble(brain, inputs, outputs, input_queue, arbiter))
    }

    /// Wire from already-built parts. Tests use this to inject mocks.
    #[must_use]
    pub fn assemble(
        brain: Brain,
        inputs: Vec<Box<dyn InputAdapter>>,
        outputs: Vec<Box<dyn OutputAdapter>>,
        input_queue: Arc<EventQueue>,
        arbiter: Arc<AudioArbiter>,
    ) -> Self {
        let router = EventRouter::from_adapters(&outputs);
        Self {
            input_queue,
            arbiter,
            brain,
            router,
            inputs,
            outputs,
        }
    }

    /// Shared input queue, for external producers (signal handlers)
    #[must_use]
    pub fn input_queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.input_queue)
    }

    /// Start all adapters and run the dispatch loop until a shutdown event.
    ///
    /// # Errors
    ///
    /// Returns an error if an adapter fails to start; already-started
    /// adapters are stopped before returning.
    pub fn run(mut self) -> Result<()> {
        if let Err(e) = self.start_adapters() {
            self.stop_adapters();
            return Err(e);
        }

        tracing::info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "orchestrator running"
        );

        loop {
            let Some(event) = self.input_queue.pop_timeout(POP_TIMEOUT) else {
                continue;
            };

            let shutting_down = event.kind == EventKind::Shutdown;
            let outputs = self.brain.process(&event);
            let delivered = self.router.route_all(outputs);
            tracing::trace!(event = %event, delivered, "dispatched");

            if shutting_down {
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn start_adapters(&mut self) -> Result<()> {
        // Outputs first so nothing an input produces can be lost
        for adapter in &mut self.outputs {
            adapter.start()?;
        }
        for adapter in &mut self.inputs {
            adapter.start()?;
        }
        Ok(())
    }

    fn stop_adapters(&mut self) {
        for adapter in &mut self.inputs {
            adapter.stop();
        }
        for adapter in &mut self.outputs {
            adapter.stop();
        }
    }

    /// Ordered teardown: silence the inputs, let the outputs drain (the
    /// farewell is already queued), then wait for the speaker to go idle.
    fn shutdown(&mut self) {
        tracing::info!("shutting down");

        for adapter in &mut self.inputs {
            adapter.stop();
        }
        for adapter in &mut self.outputs {
            adapter.stop();
        }

        if !self.arbiter.wait_until_idle(DRAIN_TIMEOUT) {
            tracing::warn!("audio device still busy at shutdown deadline");
        }

        let leftover = self.input_queue.len();
        if leftover > 0 {
            tracing::debug!(leftover, "input events discarded at shutdown");
        }
        tracing::info!("shutdown complete");
    }
}
