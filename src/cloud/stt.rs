//! Speech-to-text client

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;

use crate::{Error, Result};

/// Transcribes captured audio into text.
pub trait SpeechToText: Send {
    /// Transcribe WAV bytes.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or timeout. The voice adapter
    /// treats any error as a dropped detection cycle, not a fault.
    fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcription over a multipart HTTP endpoint
pub struct HttpTranscriber {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl HttpTranscriber {
    /// Create a transcriber client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stt`] if the HTTP client cannot be built.
    pub fn new(
        url: &str,
        api_key: &str,
        model: &str,
        language: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Stt(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            language,
        })
    }
}

impl SpeechToText for HttpTranscriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let part = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(format!("invalid MIME type: {e}")))?;

        let mut form = Form::new().text("model", self.model.clone()).part("file", part);
        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| Error::Stt(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Stt(format!("API error: {status} - {body}")));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .map_err(|e| Error::Stt(format!("bad response: {e}")))?;

        Ok(parsed.text)
    }
}
