//! Chat language model client

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A conversational language model.
///
/// `reply` must return within a bounded time; implementations own the timeout.
pub trait ChatModel: Send {
    /// Produce a reply to `prompt`, with whatever history the model keeps.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or timeout. The brain maps any
    /// error to its configured fallback reply.
    fn reply(&mut self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Chat model over an OpenAI-compatible chat-completions endpoint.
///
/// Keeps a sliding window of recent turns so follow-up questions have
/// context without growing the request without bound.
pub struct HttpChatModel {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    system_instruction: String,
    temperature: f64,
    history_turns: usize,
    history: VecDeque<ChatMessage>,
}

impl HttpChatModel {
    /// Create a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Llm`] if the HTTP client cannot be built.
    pub fn new(
        url: &str,
        api_key: &str,
        model: &str,
        system_instruction: &str,
        temperature: f64,
        history_turns: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Llm(format!("client build failed: {e}")))?;

        tracing::debug!(url, model, ?timeout, "chat model client initialized");

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_instruction: system_instruction.to_string(),
            temperature,
            history_turns,
            history: VecDeque::new(),
        })
    }

    fn push_turn(&mut self, role: &'static str, content: String) {
        self.history.push_back(ChatMessage { role, content });
        // Two messages per turn
        while self.history.len() > self.history_turns * 2 {
            self.history.pop_front();
        }
    }
}

impl ChatModel for HttpChatModel {
    fn reply(&mut self, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: self.system_instruction.clone(),
        });
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
                temperature: self.temperature,
            })
            .send()
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Llm(format!("API error: {status} - {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| Error::Llm(format!("bad response: {e}")))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("empty choices in response".to_string()))?;

        self.push_turn("user", prompt.to_string());
        self.push_turn("assistant", reply.clone());

        Ok(reply)
    }
}
