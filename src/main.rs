use std::env;
use std::sync::Arc;

use anyhow::Result;
use log::info;
use sqlx::postgres::PgPoolOptions;
use teloxide::prelude::*;

use habitmax::bot::{callback_handler, message_handler, AppState};
use habitmax::clock::{Clock, SystemClock};
use habitmax::config::AppConfig;
use habitmax::{db, scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; the subscriber also captures `log` records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting HabitMax Telegram Bot");

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let bot_token = env::var("TELEGRAM_BOT_TOKEN").expect("TELEGRAM_BOT_TOKEN must be set");
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    db::init_schema(&pool).await?;

    let config = AppConfig::from_env();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::new(pool.clone(), config, Arc::clone(&clock)));

    let bot = Bot::new(bot_token);

    // The reminder tick runs on the same runtime as the dispatcher
    tokio::spawn(scheduler::run(
        bot.clone(),
        pool,
        Arc::clone(&state.ai),
        clock,
    ));

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let state = Arc::clone(&state);
            move |bot: Bot, msg: Message| {
                let state = Arc::clone(&state);
                async move { message_handler(bot, msg, state).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let state = Arc::clone(&state);
            move |bot: Bot, q: CallbackQuery| {
                let state = Arc::clone(&state);
                async move { callback_handler(bot, q, state).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
