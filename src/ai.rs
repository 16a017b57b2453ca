//! # AI Completion Client
//!
//! Thin client for an OpenRouter-compatible chat-completion endpoint, used
//! to personalise reminder texts. Every call is bounded by a 30 second
//! timeout and falls back to a secondary model once before giving up; the
//! caller always has a deterministic template to fall back to, so an absent
//! or failing collaborator never blocks a delivery.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AiConfig, AI_RETRY_BASE_DELAY_MS, AI_RETRY_MAX_JITTER_MS};
use crate::models::{Habit, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Client over the AI collaborator. Constructed once at startup; cheap to
/// share behind an `Arc`.
#[derive(Debug)]
pub struct AiClient {
    config: AiConfig,
    http: reqwest::Client,
}

impl AiClient {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Whether the collaborator is configured at all
    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Run a completion, trying the primary model and then the fallback
    /// model after a short jittered delay. Returns `None` on any failure;
    /// callers must have a template fallback ready.
    pub async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Option<String> {
        let api_key = self.config.api_key.as_deref()?;

        match self
            .request_model(api_key, &self.config.model, messages, max_tokens)
            .await
        {
            Some(text) => Some(text),
            None => {
                let jitter = rand::thread_rng().gen_range(0..AI_RETRY_MAX_JITTER_MS);
                tokio::time::sleep(std::time::Duration::from_millis(
                    AI_RETRY_BASE_DELAY_MS + jitter,
                ))
                .await;
                debug!(model = %self.config.fallback_model, "Retrying with fallback model");
                self.request_model(api_key, &self.config.fallback_model, messages, max_tokens)
                    .await
            }
        }
    }

    async fn request_model(
        &self,
        api_key: &str,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Option<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = CompletionRequest {
            model,
            messages,
            max_tokens,
            temperature: 0.7,
        };

        let response = match self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(model, error = %e, "AI request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(model, status = %response.status(), "AI request rejected");
            return None;
        }

        match response.json::<CompletionResponse>().await {
            Ok(body) => body
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content.trim().to_string())
                .filter(|text| !text.is_empty()),
            Err(e) => {
                warn!(model, error = %e, "AI response body unreadable");
                None
            }
        }
    }

    /// Short motivational reminder for one habit. `None` means the caller
    /// should use [`reminder_fallback`].
    pub async fn personalized_reminder(&self, user: &User, habit: &Habit) -> Option<String> {
        let messages = [
            ChatMessage::system(
                "You are a friendly habit coach inside a Telegram bot. \
                 Write a short, encouraging reminder in at most two sentences. \
                 No hashtags, no quotes around the text.",
            ),
            ChatMessage::user(format!(
                "Remind {} to do the habit \"{}\" (current streak: {} days).",
                user.first_name, habit.name, habit.current_streak
            )),
        ];
        self.complete(&messages, 200).await
    }
}

/// Deterministic reminder template used whenever AI is disabled,
/// unconfigured or failing
pub fn reminder_fallback(habit: &Habit) -> String {
    format!(
        "{} Reminder!\n\nTime for your habit: {}\n🔥 Current streak: {} days",
        habit.emoji, habit.name, habit.current_streak
    )
}
