use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dolgobot::bot;
use dolgobot::config::BotConfig;
use dolgobot::db;
use dolgobot::dialogue::DebtDialogueState;
use dolgobot::localization;
use dolgobot::reminders;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; the parser's `log` records are picked up by the subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting DolgoBot");

    let config = Arc::new(BotConfig::from_env().context("Invalid configuration")?);

    localization::init_localization().context("Failed to load translations")?;

    info!(max_connections = config.database_max_connections, "Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    db::init_database_schema(&pool).await?;
    let shared_pool = Arc::new(pool);

    let bot = Bot::new(config.bot_token.clone());

    tokio::spawn(reminders::run_reminder_worker(
        bot.clone(),
        Arc::clone(&shared_pool),
        Arc::clone(&config),
    ));

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<DebtDialogueState>, DebtDialogueState>()
                .endpoint(bot::message_handler),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, InMemStorage<DebtDialogueState>, DebtDialogueState>()
                .endpoint(bot::callback_handler),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            InMemStorage::<DebtDialogueState>::new(),
            shared_pool,
            config
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
