//! Voice input adapter
//!
//! Captures microphone audio under an input claim, cuts it into utterances
//! with an energy gate, transcribes each utterance, and emits the ones that
//! open with a wake word. The claim is abandoned immediately when playback
//! preempts listening, so the assistant never transcribes its own voice.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::adapters::{InputAdapter, Worker};
use crate::audio::{AudioArbiter, CAPTURE_SAMPLE_RATE, Microphone, samples_to_wav};
use crate::cloud::SpeechToText;
use crate::events::{Event, EventKind, EventPriority, EventQueue, Payload};
use crate::{Error, Result};

/// Drain-and-feed cadence while listening
const CHUNK_PERIOD: Duration = Duration::from_millis(100);
/// Backoff while the device is held by the speaker
const BUSY_BACKOFF: Duration = Duration::from_millis(250);

/// Spoken phrases that shut the system down once the wake word matched
const QUIT_PHRASES: &[&str] = &["shut down", "shutdown", "goodbye"];

/// Energy-gate utterance segmentation over a mono sample stream.
///
/// Speech opens when a chunk's RMS crosses the threshold and closes after a
/// run of quiet chunks. Utterances are length-bounded both ways: too short is
/// discarded as noise, too long is cut and flushed.
pub struct SpeechSegmenter {
    threshold: f32,
    silence_chunks: usize,
    min_samples: usize,
    max_samples: usize,
    buffer: Vec<f32>,
    active: bool,
    quiet_run: usize,
}

impl SpeechSegmenter {
    #[must_use]
    pub fn new(threshold: f32, silence: Duration, min_len: Duration, max_len: Duration) -> Self {
        let per_second = CAPTURE_SAMPLE_RATE as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let to_samples = |d: Duration| (d.as_secs_f64() * per_second as f64) as usize;
        Self {
            threshold,
            silence_chunks: (silence.as_millis() / CHUNK_PERIOD.as_millis()).max(1) as usize,
            min_samples: to_samples(min_len),
            max_samples: to_samples(max_len),
            buffer: Vec::new(),
            active: false,
            quiet_run: 0,
        }
    }

    /// Defaults tuned for near-field speech at 16kHz
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            0.015,
            Duration::from_millis(700),
            Duration::from_millis(300),
            Duration::from_secs(15),
        )
    }

    /// Feed one chunk; returns a complete utterance when one closes
    pub fn feed(&mut self, chunk: &[f32]) -> Option<Vec<f32>> {
        if chunk.is_empty() {
            return None;
        }
        let rms = rms(chunk);
        let loud = rms > self.threshold;

        if self.active {
            self.buffer.extend_from_slice(chunk);
            if loud {
                self.quiet_run = 0;
            } else {
                self.quiet_run += 1;
            }

            if self.quiet_run >= self.silence_chunks || self.buffer.len() >= self.max_samples {
                return self.close();
            }
        } else if loud {
            self.active = true;
            self.quiet_run = 0;
            self.buffer.extend_from_slice(chunk);
        }

        None
    }

    /// Discard any in-progress utterance
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.active = false;
        self.quiet_run = 0;
    }

    fn close(&mut self) -> Option<Vec<f32>> {
        let utterance = std::mem::take(&mut self.buffer);
        self.active = false;
        self.quiet_run = 0;
        if utterance.len() < self.min_samples {
            tracing::trace!(samples = utterance.len(), "utterance too short, discarding");
            return None;
        }
        Some(utterance)
    }
}

fn rms(chunk: &[f32]) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let mean = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
    mean.sqrt()
}

/// Match a transcript against the wake word list.
///
/// Returns the command with the wake word stripped, or `None` when no wake
/// word opens the transcript. An empty wake word list accepts everything.
pub(crate) fn match_wake_word(transcript: &str, wake_words: &[String]) -> Option<String> {
    let trimmed = transcript.trim();
    if wake_words.is_empty() {
        return Some(trimmed.to_string());
    }

    let lowered = trimmed.to_lowercase();
    for wake in wake_words {
        let wake = wake.to_lowercase();
        if let Some(rest) = lowered.strip_prefix(&wake) {
            // The wake word must end at a word boundary; "buddying" does
            // not wake "buddy"
            if rest.chars().next().is_some_and(char::is_alphanumeric) {
                continue;
            }
            let rest = rest.trim_start_matches([',', '.', '!', '?', ' ']);
            // Preserve the original casing of the command part; lowercasing
            // can shift byte offsets outside ASCII, so fall back to the
            // lowered text when the slice does not line up
            let command = trimmed
                .get(trimmed.len().saturating_sub(rest.len())..)
                .unwrap_or(rest)
                .trim();
            return Some(command.to_string());
        }
    }
    None
}

pub struct VoiceInput {
    name: String,
    queue: Arc<EventQueue>,
    arbiter: Arc<AudioArbiter>,
    stt: Option<Box<dyn SpeechToText>>,
    wake_words: Vec<String>,
    worker: Option<Worker>,
}

impl VoiceInput {
    #[must_use]
    pub fn new(
        name: &str,
        queue: Arc<EventQueue>,
        arbiter: Arc<AudioArbiter>,
        stt: Box<dyn SpeechToText>,
        wake_words: Vec<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue,
            arbiter,
            stt: Some(stt),
            wake_words,
            worker: None,
        }
    }

    /// Map a transcript to the event it warrants, if any
    pub(crate) fn transcript_to_event(
        transcript: &str,
        wake_words: &[String],
        source: &str,
    ) -> Option<Event> {
        let command = match_wake_word(transcript, wake_words)?;
        if command.is_empty() {
            return None;
        }

        if QUIT_PHRASES.contains(&command.to_lowercase().as_str()) {
            return Some(
                Event::input(EventKind::Shutdown, Payload::Empty, source)
                    .with_priority(EventPriority::Critical),
            );
        }

        Some(
            Event::input(EventKind::UserSpeech, Payload::Text(command), source)
                .with_priority(EventPriority::High),
        )
    }

    fn transcribe_and_emit(
        stt: &dyn SpeechToText,
        queue: &Arc<EventQueue>,
        wake_words: &[String],
        source: &str,
        utterance: &[f32],
    ) {
        let wav = match samples_to_wav(utterance, CAPTURE_SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "wav encode failed");
                return;
            }
        };

        let transcript = match stt.transcribe(&wav) {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, dropping utterance");
                return;
            }
        };

        tracing::debug!(transcript = %transcript, "transcribed");
        if let Some(event) = Self::transcript_to_event(&transcript, wake_words, source) {
            super::push_or_drop(queue, event);
        } else {
            tracing::trace!("no wake word, ignoring transcript");
        }
    }
}

impl InputAdapter for VoiceInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn emitted_kinds(&self) -> &'static [EventKind] {
        &[EventKind::UserSpeech, EventKind::Shutdown]
    }

    /// The microphone is opened on the worker thread (capture streams are
    /// thread-bound); a missing device is reported there and the worker
    /// exits.
    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(stt) = self.stt.take() else {
            return Err(Error::Adapter(format!("{}: transcriber already consumed", self.name)));
        };

        let queue = Arc::clone(&self.queue);
        let arbiter = Arc::clone(&self.arbiter);
        let wake_words = self.wake_words.clone();
        let source = self.name.clone();
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            let mut mic = match Microphone::open() {
                Ok(mic) => mic,
                Err(e) => {
                    tracing::error!(error = %e, "microphone unavailable, voice input disabled");
                    return;
                }
            };
            let mut segmenter = SpeechSegmenter::with_defaults();

            while !stop.load(Ordering::Acquire) {
                let Some(claim) = arbiter.claim_input() else {
                    std::thread::sleep(BUSY_BACKOFF);
                    continue;
                };

                if let Err(e) = mic.start() {
                    tracing::error!(error = %e, "capture start failed");
                    drop(claim);
                    std::thread::sleep(BUSY_BACKOFF);
                    continue;
                }
                segmenter.reset();
                mic.clear();

                let utterance = loop {
                    if stop.load(Ordering::Acquire) {
                        break None;
                    }
                    if arbiter.take_interrupt() {
                        tracing::debug!("listen preempted by playback, abandoning capture");
                        break None;
                    }
                    std::thread::sleep(CHUNK_PERIOD);
                    let chunk = mic.drain();
                    if let Some(utterance) = segmenter.feed(&chunk) {
                        break Some(utterance);
                    }
                };

                mic.stop();
                segmenter.reset();
                drop(claim);

                // Transcription happens without the claim so playback can
                // take the device during the HTTP round trip
                if let Some(utterance) = utterance {
                    Self::transcribe_and_emit(
                        stt.as_ref(),
                        &queue,
                        &wake_words,
                        &source,
                        &utterance,
                    );
                }
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop_and_join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wake_words() -> Vec<String> {
        vec!["buddy".to_string(), "hey buddy".to_string()]
    }

    #[test]
    fn segmenter_cuts_on_silence() {
        let mut seg = SpeechSegmenter::new(
            0.1,
            Duration::from_millis(200),
            Duration::from_millis(100),
            Duration::from_secs(10),
        );
        let loud = vec![0.5f32; 1600];
        let quiet = vec![0.0f32; 1600];

        assert!(seg.feed(&quiet).is_none());
        // 500ms of speech
        for _ in 0..5 {
            assert!(seg.feed(&loud).is_none());
        }
        // Two quiet chunks close the utterance
        assert!(seg.feed(&quiet).is_none());
        let utterance = seg.feed(&quiet).expect("utterance closes");
        // Speech plus the trailing quiet chunks
        assert_eq!(utterance.len(), 7 * 1600);
    }

    #[test]
    fn segmenter_discards_short_blips() {
        let mut seg = SpeechSegmenter::new(
            0.1,
            Duration::from_millis(200),
            Duration::from_secs(1),
            Duration::from_secs(10),
        );
        let loud = vec![0.5f32; 1600];
        let quiet = vec![0.0f32; 1600];

        assert!(seg.feed(&loud).is_none());
        assert!(seg.feed(&quiet).is_none());
        // Under the 1s minimum: discarded, not returned
        assert!(seg.feed(&quiet).is_none());
        assert!(seg.feed(&quiet).is_none());
    }

    #[test]
    fn segmenter_flushes_at_max_length() {
        let mut seg = SpeechSegmenter::new(
            0.1,
            Duration::from_secs(60),
            Duration::from_millis(100),
            Duration::from_millis(500),
        );
        let loud = vec![0.5f32; 1600];
        let mut result = None;
        for _ in 0..10 {
            if let Some(u) = seg.feed(&loud) {
                result = Some(u);
                break;
            }
        }
        assert!(result.is_some());
    }

    #[test]
    fn wake_word_strips_prefix() {
        assert_eq!(
            match_wake_word("Buddy, what time is it?", &wake_words()),
            Some("what time is it?".to_string())
        );
        assert_eq!(match_wake_word("what time is it", &wake_words()), None);
    }

    #[test]
    fn wake_word_needs_a_word_boundary() {
        assert_eq!(match_wake_word("buddying along", &wake_words()), None);
        assert_eq!(
            match_wake_word("buddy. lights on", &wake_words()),
            Some("lights on".to_string())
        );
    }

    #[test]
    fn empty_wake_list_accepts_everything() {
        assert_eq!(
            match_wake_word("anything goes", &[]),
            Some("anything goes".to_string())
        );
    }

    #[test]
    fn quit_phrase_becomes_voice_shutdown() {
        let event =
            VoiceInput::transcript_to_event("buddy shut down", &wake_words(), "voice").unwrap();
        assert_eq!(event.kind, EventKind::Shutdown);
        assert_eq!(event.priority, EventPriority::Critical);
        assert_eq!(event.source.as_deref(), Some("voice"));
    }

    #[test]
    fn command_becomes_high_priority_speech() {
        let event =
            VoiceInput::transcript_to_event("hey buddy turn on the light", &wake_words(), "voice")
                .unwrap();
        assert_eq!(event.kind, EventKind::UserSpeech);
        assert_eq!(event.payload.as_text(), Some("turn on the light"));
    }

    #[test]
    fn bare_wake_word_is_ignored() {
        assert!(VoiceInput::transcript_to_event("buddy", &wake_words(), "voice").is_none());
    }
}
