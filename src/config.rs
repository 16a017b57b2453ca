//! # Core Configuration Module
//!
//! Configuration for the dialogue engine, streak evaluation and reminder
//! scheduling. Values come from the environment with sensible defaults;
//! the reminder tick interval is fixed and not configurable.

use std::env;
use std::time::Duration;

// Defaults for the core engine
pub const DEFAULT_DIALOGUE_TIMEOUT_MINUTES: u64 = 10;
pub const DEFAULT_STREAK_BREAK_DAYS: i32 = 2;
pub const REMINDER_TICK_SECS: u64 = 60;
pub const STREAK_CHECK_CADENCE_SECS: i64 = 3600;

// AI collaborator limits
pub const AI_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const AI_RETRY_BASE_DELAY_MS: u64 = 500;
pub const AI_RETRY_MAX_JITTER_MS: u64 = 500;

/// Dialogue engine settings
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Inactivity window after which a session is force-cleared
    pub timeout: Duration,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_DIALOGUE_TIMEOUT_MINUTES * 60),
        }
    }
}

/// Streak evaluation settings
#[derive(Debug, Clone)]
pub struct StreakConfig {
    /// Default break-days applied to new users (per-user value wins)
    pub default_break_days: i32,
    /// Minimum seconds between lazy per-user evaluations
    pub check_cadence_secs: i64,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            default_break_days: DEFAULT_STREAK_BREAK_DAYS,
            check_cadence_secs: STREAK_CHECK_CADENCE_SECS,
        }
    }
}

/// AI completion collaborator settings. `api_key == None` disables the
/// collaborator entirely; every caller then uses the template fallback.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub fallback_model: String,
    pub request_timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "meta-llama/llama-3.1-8b-instruct".to_string(),
            fallback_model: "mistralai/mistral-7b-instruct".to_string(),
            request_timeout: Duration::from_secs(AI_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub dialogue: DialogueConfig,
    pub streak: StreakConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    /// Load configuration from the environment, keeping defaults for
    /// anything unset or unparseable
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();

        if let Some(minutes) = env_parse::<u64>("DIALOGUE_TIMEOUT_MINUTES") {
            config.dialogue.timeout = Duration::from_secs(minutes * 60);
        }
        if let Some(days) = env_parse::<i32>("STREAK_BREAK_DAYS_DEFAULT") {
            config.streak.default_break_days = days;
        }
        if let Ok(key) = env::var("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                config.ai.api_key = Some(key);
            }
        }
        if let Ok(model) = env::var("OPENROUTER_MODEL") {
            if !model.trim().is_empty() {
                config.ai.model = model;
            }
        }
        if let Ok(url) = env::var("OPENROUTER_BASE_URL") {
            if !url.trim().is_empty() {
                config.ai.base_url = url;
            }
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
