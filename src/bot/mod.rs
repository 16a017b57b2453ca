//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: commands and dialogue text input
//! - `callback_handler`: inline keyboard callback queries
//! - `dialogue_manager`: drives the dialogue state machine and the commit
//! - `ui_builder`: creates keyboards and formats messages

pub mod callback_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

use std::sync::Arc;

use sqlx::postgres::PgPool;

use crate::ai::AiClient;
use crate::cache::CompletionCache;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::session::{SessionStore, UserGate};
use crate::timeout::TimeoutMonitor;

/// Everything the handlers share, captured once in `main` and cloned into
/// the dispatcher closures behind an `Arc`
pub struct AppState {
    pub pool: PgPool,
    pub sessions: SessionStore,
    pub gate: UserGate,
    pub timeout: TimeoutMonitor,
    pub completions: CompletionCache,
    pub ai: Arc<AiClient>,
    pub clock: Arc<dyn Clock>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            sessions: SessionStore::new(),
            gate: UserGate::new(),
            timeout: TimeoutMonitor::new(&config.dialogue),
            completions: CompletionCache::new(),
            ai: Arc::new(AiClient::new(config.ai.clone())),
            clock,
            config,
        }
    }
}
