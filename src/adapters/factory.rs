//! Adapter construction registry
//!
//! Maps the `kind` string of a config declaration to a constructor. The
//! registry is explicit: every buildable adapter is listed here, and an
//! unknown kind fails configuration loading instead of being skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::adapters::input::{
    ClimateInput, ClimateReading, DirectInput, KeyboardInput, PresenceSample, RadarInput,
    ScriptedClimateSensor, ScriptedPresenceSensor, VoiceInput,
};
use crate::adapters::output::{
    ConsoleOutput, LedOutput, MockLedDriver, SpeechOutput, StorageOutput, SysfsLedDriver,
};
use crate::adapters::{InputAdapter, OutputAdapter};
use crate::audio::AudioArbiter;
use crate::cloud::{HttpSynthesizer, HttpTranscriber};
use crate::config::{AdapterDecl, Config};
use crate::db::MemoryStore;
use crate::events::{Event, EventKind, EventPriority, EventQueue, Payload};
use crate::{Error, Result};

/// Shared dependencies handed to every constructor
pub struct AdapterContext {
    pub config: Config,
    pub input_queue: Arc<EventQueue>,
    pub arbiter: Arc<AudioArbiter>,
}

/// What a constructor produced
pub enum BuiltAdapter {
    Input(Box<dyn InputAdapter>),
    Output(Box<dyn OutputAdapter>),
}

type Constructor = fn(&AdapterDecl, &AdapterContext) -> Result<BuiltAdapter>;

pub struct AdapterFactory {
    registry: HashMap<&'static str, Constructor>,
}

impl AdapterFactory {
    /// Registry with every built-in adapter kind
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut factory = Self {
            registry: HashMap::new(),
        };
        factory.register("voice", build_voice);
        factory.register("keyboard", build_keyboard);
        #[cfg(unix)]
        factory.register("pipe", build_pipe);
        factory.register("radar", build_radar);
        factory.register("climate", build_climate);
        factory.register("direct", build_direct);
        factory.register("speech", build_speech);
        factory.register("console", build_console);
        factory.register("led", build_led);
        factory.register("storage", build_storage);
        factory
    }

    /// Register (or override) a constructor for `kind`
    pub fn register(&mut self, kind: &'static str, constructor: Constructor) {
        self.registry.insert(kind, constructor);
    }

    /// Registered kinds, sorted, for error messages and diagnostics
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.registry.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build one adapter from its declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown kind or bad settings.
    pub fn build(&self, decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
        let constructor = self.registry.get(decl.kind.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "unknown adapter kind '{}' (known: {})",
                decl.kind,
                self.kinds().join(", ")
            ))
        })?;
        constructor(decl, ctx)
    }

    /// Build every declared adapter, partitioned by direction.
    ///
    /// # Errors
    ///
    /// Fails on the first bad declaration; partial startup is not a state
    /// worth supporting.
    pub fn build_all(
        &self,
        ctx: &AdapterContext,
    ) -> Result<(Vec<Box<dyn InputAdapter>>, Vec<Box<dyn OutputAdapter>>)> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for decl in &ctx.config.adapters {
            match self.build(decl, ctx)? {
                BuiltAdapter::Input(adapter) => {
                    tracing::info!(kind = %decl.kind, name = adapter.name(), "input adapter built");
                    inputs.push(adapter);
                }
                BuiltAdapter::Output(adapter) => {
                    tracing::info!(kind = %decl.kind, name = adapter.name(), "output adapter built");
                    outputs.push(adapter);
                }
            }
        }
        Ok((inputs, outputs))
    }
}

fn parse_settings<T: DeserializeOwned + Default>(decl: &AdapterDecl) -> Result<T> {
    if decl.settings.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(decl.settings.clone()).map_err(|e| {
        Error::Config(format!("bad settings for adapter '{}': {e}", decl.instance_name()))
    })
}

fn build_voice(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    let voice = &ctx.config.voice;
    let stt = HttpTranscriber::new(
        &voice.stt_url,
        &ctx.config.api_key(),
        &voice.stt_model,
        voice.language.clone(),
        ctx.config.request_timeout(),
    )?;
    Ok(BuiltAdapter::Input(Box::new(VoiceInput::new(
        decl.instance_name(),
        Arc::clone(&ctx.input_queue),
        Arc::clone(&ctx.arbiter),
        Box::new(stt),
        voice.wake_words.clone(),
    ))))
}

fn build_keyboard(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    Ok(BuiltAdapter::Input(Box::new(KeyboardInput::new(
        decl.instance_name(),
        Arc::clone(&ctx.input_queue),
    ))))
}

#[cfg(unix)]
fn build_pipe(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    #[derive(Default, Deserialize)]
    struct PipeSettings {
        path: Option<std::path::PathBuf>,
    }

    let settings: PipeSettings = parse_settings(decl)?;
    let path = match settings.path {
        Some(path) => path,
        None => ctx.config.data_dir()?.join("buddy.pipe"),
    };
    Ok(BuiltAdapter::Input(Box::new(
        crate::adapters::input::PipeInput::new(
            decl.instance_name(),
            path,
            Arc::clone(&ctx.input_queue),
        ),
    )))
}

fn build_radar(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    #[derive(Deserialize)]
    struct Step {
        present: bool,
        #[serde(default)]
        moving: bool,
    }

    #[derive(Default, Deserialize)]
    struct RadarSettings {
        #[serde(default)]
        samples: Vec<Step>,
        poll_interval_ms: Option<u64>,
    }

    let settings: RadarSettings = parse_settings(decl)?;
    let samples = settings
        .samples
        .iter()
        .map(|s| PresenceSample {
            present: s.present,
            moving: s.moving,
        })
        .collect();
    Ok(BuiltAdapter::Input(Box::new(RadarInput::new(
        decl.instance_name(),
        Arc::clone(&ctx.input_queue),
        Box::new(ScriptedPresenceSensor::new(samples)),
        Duration::from_millis(settings.poll_interval_ms.unwrap_or(500)),
    ))))
}

fn build_climate(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    #[derive(Deserialize)]
    struct Step {
        temperature_c: f64,
        humidity_pct: f64,
    }

    #[derive(Default, Deserialize)]
    struct ClimateSettings {
        #[serde(default)]
        readings: Vec<Step>,
        poll_interval_ms: Option<u64>,
    }

    let settings: ClimateSettings = parse_settings(decl)?;
    let readings = settings
        .readings
        .iter()
        .map(|s| ClimateReading {
            temperature_c: s.temperature_c,
            humidity_pct: s.humidity_pct,
        })
        .collect();
    Ok(BuiltAdapter::Input(Box::new(ClimateInput::new(
        decl.instance_name(),
        Arc::clone(&ctx.input_queue),
        Box::new(ScriptedClimateSensor::new(readings)),
        Duration::from_millis(settings.poll_interval_ms.unwrap_or(60_000)),
    ))))
}

fn build_direct(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    #[derive(Deserialize)]
    struct Step {
        kind: EventKind,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default)]
        priority: Option<EventPriority>,
    }

    #[derive(Default, Deserialize)]
    struct DirectSettings {
        #[serde(default)]
        steps: Vec<Step>,
        interval_ms: Option<u64>,
        #[serde(default, rename = "loop")]
        looping: bool,
    }

    let settings: DirectSettings = parse_settings(decl)?;
    let mut steps = Vec::with_capacity(settings.steps.len());
    for step in settings.steps {
        if step.kind.is_input() {
            return Err(Error::Config(format!(
                "adapter '{}': step kind '{}' is not an output kind",
                decl.instance_name(),
                step.kind
            )));
        }
        let mut event = Event::output(step.kind, Payload::from_json(step.payload));
        if let Some(priority) = step.priority {
            event = event.with_priority(priority);
        }
        steps.push(event);
    }

    Ok(BuiltAdapter::Input(Box::new(DirectInput::new(
        decl.instance_name(),
        Arc::clone(&ctx.input_queue),
        steps,
        Duration::from_millis(settings.interval_ms.unwrap_or(1000)),
        settings.looping,
    ))))
}

fn build_speech(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    let voice = &ctx.config.voice;
    let tts = HttpSynthesizer::new(
        &voice.tts_url,
        &ctx.config.api_key(),
        &voice.tts_model,
        &voice.tts_voice,
        voice.tts_speed,
        ctx.config.request_timeout(),
    )?;
    Ok(BuiltAdapter::Output(Box::new(SpeechOutput::new(
        decl.instance_name(),
        ctx.config.queues.output_capacity,
        Box::new(tts),
        Arc::clone(&ctx.arbiter),
    ))))
}

fn build_console(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    Ok(BuiltAdapter::Output(Box::new(ConsoleOutput::new(
        decl.instance_name(),
        ctx.config.queues.output_capacity,
    ))))
}

fn build_led(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    #[derive(Default, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum DriverKind {
        Sysfs,
        #[default]
        Mock,
    }

    #[derive(Default, Deserialize)]
    struct LedSettings {
        #[serde(default)]
        driver: DriverKind,
        path: Option<std::path::PathBuf>,
    }

    let settings: LedSettings = parse_settings(decl)?;
    let driver: Box<dyn crate::adapters::output::LedDriver> = match settings.driver {
        DriverKind::Sysfs => {
            let path = settings.path.ok_or_else(|| {
                Error::Config(format!(
                    "adapter '{}': sysfs driver needs a path",
                    decl.instance_name()
                ))
            })?;
            Box::new(SysfsLedDriver::new(path))
        }
        DriverKind::Mock => Box::new(MockLedDriver::new()),
    };

    Ok(BuiltAdapter::Output(Box::new(LedOutput::new(
        decl.instance_name(),
        ctx.config.queues.output_capacity,
        driver,
    ))))
}

fn build_storage(decl: &AdapterDecl, ctx: &AdapterContext) -> Result<BuiltAdapter> {
    let db_path = ctx.config.data_dir()?.join("buddy.db");
    let store = MemoryStore::open(&db_path)?;
    Ok(BuiltAdapter::Output(Box::new(StorageOutput::new(
        decl.instance_name(),
        ctx.config.queues.output_capacity,
        store,
    ))))
}
