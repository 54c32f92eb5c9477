use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use buddy::audio::{Microphone, Speaker};
use buddy::cloud::{HttpSynthesizer, TextToSpeech};
use buddy::events::{Event, EventKind, EventPriority, Payload};
use buddy::{Config, Orchestrator};

/// Buddy - event-driven home voice assistant
#[derive(Parser)]
#[command(name = "buddy", version, about)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "BUDDY_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,buddy=info",
        1 => "info,buddy=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration),
            Command::TestSpeaker => test_speaker(),
            Command::TestTts { text } => test_tts(cli.config.as_deref(), &text),
        };
    }

    let config_path = cli
        .config
        .unwrap_or_else(buddy::config::default_config_path);
    let config = Config::load(&config_path)?;

    let orchestrator = Orchestrator::from_config(config)?;
    let input_queue = orchestrator.input_queue();

    // Ctrl-C becomes a critical shutdown event, same path as every other
    // shutdown source
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let event = Event::input(EventKind::Shutdown, Payload::Empty, "signal")
                .with_priority(EventPriority::Critical);
            if let Err(e) = input_queue.push(event) {
                tracing::error!(error = %e, "could not enqueue shutdown");
            }
        }
    });

    tracing::info!("buddy ready");

    // The dispatch loop and its workers are all blocking
    tokio::task::spawn_blocking(move || orchestrator.run()).await??;

    Ok(())
}

/// Test microphone input
fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = Microphone::open()?;
    mic.start()?;
    println!("---");

    for i in 0..duration {
        std::thread::sleep(Duration::from_secs(1));

        let samples = mic.drain();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    mic.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let speaker = Speaker::open()?;

    // 2 seconds of 440Hz sine at 24kHz
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    speaker.play(samples)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS synthesis and playback end to end
fn test_tts(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let path = config_path.map_or_else(buddy::config::default_config_path, PathBuf::from);
    let config = Config::load(&path)?;

    let tts = HttpSynthesizer::new(
        &config.voice.tts_url,
        &config.api_key(),
        &config.voice.tts_model,
        &config.voice.tts_voice,
        config.voice.tts_speed,
        config.request_timeout(),
    )?;

    println!("Synthesizing...");
    let mp3 = tts.synthesize(text)?;
    println!("Got {} bytes of audio, playing...", mp3.len());

    let speaker = Speaker::open()?;
    speaker.play_mp3(&mp3)?;

    println!("\nDone!");
    Ok(())
}
