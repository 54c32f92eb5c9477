//! Speech output adapter
//!
//! Synthesizes each utterance and plays it while holding the audio device
//! claim. The claim is a scoped guard, so a panic-free return path always
//! gives the device back. A busy device is retried with backoff and the
//! utterance is eventually dropped rather than queued forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::adapters::{OutputAdapter, Worker};
use crate::audio::{AudioArbiter, Speaker};
use crate::cloud::TextToSpeech;
use crate::events::{Event, EventKind, EventQueue};
use crate::{Error, Result};

const POLL: Duration = Duration::from_millis(200);
const CLAIM_RETRY: Duration = Duration::from_millis(250);
const CLAIM_ATTEMPTS: u32 = 40;

/// Seam over the physical speaker so tests can run without audio hardware
pub(crate) trait AudioSink: Send {
    fn play_mp3(&self, mp3: &[u8]) -> Result<()>;
}

impl AudioSink for Speaker {
    fn play_mp3(&self, mp3: &[u8]) -> Result<()> {
        Self::play_mp3(self, mp3)
    }
}

pub struct SpeechOutput {
    name: String,
    queue: Arc<EventQueue>,
    arbiter: Arc<AudioArbiter>,
    tts: Option<Box<dyn TextToSpeech>>,
    sink: Option<Box<dyn AudioSink>>,
    worker: Option<Worker>,
}

impl SpeechOutput {
    /// Adapter that opens the default speaker on `start`
    #[must_use]
    pub fn new(
        name: &str,
        capacity: usize,
        tts: Box<dyn TextToSpeech>,
        arbiter: Arc<AudioArbiter>,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue: Arc::new(EventQueue::bounded(name, capacity)),
            arbiter,
            tts: Some(tts),
            sink: None,
            worker: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_sink(
        name: &str,
        capacity: usize,
        tts: Box<dyn TextToSpeech>,
        arbiter: Arc<AudioArbiter>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue: Arc::new(EventQueue::bounded(name, capacity)),
            arbiter,
            tts: Some(tts),
            sink: Some(sink),
            worker: None,
        }
    }

    fn speak(
        tts: &dyn TextToSpeech,
        sink: &dyn AudioSink,
        arbiter: &Arc<AudioArbiter>,
        stop: &AtomicBool,
        event: &Event,
    ) {
        let Some(text) = event.payload.as_text() else {
            tracing::warn!("speak event without text payload");
            return;
        };

        // Synthesize before claiming so the device is not held through an
        // HTTP round trip
        let mp3 = match tts.synthesize(text) {
            Ok(mp3) => mp3,
            Err(e) => {
                tracing::error!(error = %e, "synthesis failed, dropping utterance");
                return;
            }
        };

        let mut claim = None;
        for attempt in 0..CLAIM_ATTEMPTS {
            if let Some(c) = arbiter.claim_output() {
                claim = Some(c);
                break;
            }
            if stop.load(Ordering::Acquire) {
                tracing::debug!("stopping while waiting for the device, dropping utterance");
                return;
            }
            tracing::trace!(attempt, "audio device busy, retrying");
            std::thread::sleep(CLAIM_RETRY);
        }
        let Some(claim) = claim else {
            tracing::warn!(text_len = text.len(), "audio device stayed busy, dropping utterance");
            return;
        };

        tracing::debug!(text_len = text.len(), mp3_bytes = mp3.len(), "speaking");
        if let Err(e) = sink.play_mp3(&mp3) {
            tracing::error!(error = %e, "playback failed");
        }
        drop(claim);
    }
}

impl OutputAdapter for SpeechOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn handled_kinds(&self) -> &'static [EventKind] {
        &[EventKind::Speak]
    }

    fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(tts) = self.tts.take() else {
            return Err(Error::Adapter(format!("{}: synthesizer already consumed", self.name)));
        };
        let sink: Box<dyn AudioSink> = match self.sink.take() {
            Some(sink) => sink,
            None => Box::new(Speaker::open()?),
        };

        let queue = Arc::clone(&self.queue);
        let arbiter = Arc::clone(&self.arbiter);
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            loop {
                if let Some(event) = queue.pop_timeout(POLL) {
                    Self::speak(tts.as_ref(), sink.as_ref(), &arbiter, stop, &event);
                } else if stop.load(Ordering::Acquire) {
                    break;
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
