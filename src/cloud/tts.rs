//! Text-to-speech client

use std::time::Duration;

use serde::Serialize;

use crate::{Error, Result};

/// Renders text into playable audio.
pub trait TextToSpeech: Send {
    /// Synthesize `text` into MP3 bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or timeout. The speech adapter
    /// logs the failure and drops the utterance.
    fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f64,
}

/// TTS over an OpenAI-compatible audio/speech endpoint, returning MP3
pub struct HttpSynthesizer {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    voice: String,
    speed: f64,
}

impl HttpSynthesizer {
    /// Create a synthesizer client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if the HTTP client cannot be built.
    pub fn new(
        url: &str,
        api_key: &str,
        model: &str,
        voice: &str,
        speed: f64,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Tts(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            voice: voice.to_string(),
            speed,
        })
    }
}

impl TextToSpeech for HttpSynthesizer {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                speed: self.speed,
            })
            .send()
            .map_err(|e| Error::Tts(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Tts(format!("API error: {status} - {body}")));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::Tts(format!("body read failed: {e}")))?;

        Ok(bytes.to_vec())
    }
}
