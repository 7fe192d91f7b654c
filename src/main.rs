use dotenvy::dotenv;
use footer_bot::bot::handlers::{schema, Engine};
use footer_bot::bot::resilient::RetryingMessenger;
use footer_bot::bot::transport::TelegramTransport;
use footer_bot::cleanup::CleanupManager;
use footer_bot::config::{Settings, REAPER_INTERVAL, SESSION_TTL};
use footer_bot::conversation::ConversationMachine;
use footer_bot::pipeline::convert::SubprocessConverter;
use footer_bot::pipeline::DocumentPipeline;
use footer_bot::session::SessionStore;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting Document Footer Bot...");

    let settings = init_settings();
    let work_dir = PathBuf::from(&settings.work_dir);
    tokio::fs::create_dir_all(&work_dir).await?;

    let store = Arc::new(SessionStore::new());
    let cleanup = Arc::new(CleanupManager::new(store.clone(), work_dir.clone()));

    // Clear out anything a previous crash left behind
    cleanup.sweep().await;

    let bot = Bot::new(settings.telegram_token.clone());
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let messenger = RetryingMessenger::new(transport);
    let converter = Arc::new(SubprocessConverter::new(settings.soffice_bin.clone()));
    let pipeline = DocumentPipeline::new(converter, work_dir.clone());

    let engine: Arc<Engine> = Arc::new(ConversationMachine::new(
        store,
        messenger,
        pipeline,
        cleanup.clone(),
        work_dir,
    ));

    spawn_reaper(engine.clone());

    info!("Bot is running...");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Dispatch returned: intake has stopped and in-flight handlers have
    // drained. Sweep before the transport drops.
    cleanup.sweep().await;
    info!("Shutdown complete.");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Periodically release conversations abandoned mid-flow.
fn spawn_reaper(engine: Arc<Engine>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAPER_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.reap_stale(SESSION_TTL).await;
        }
    });
}
