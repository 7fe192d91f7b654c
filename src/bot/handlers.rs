//! Telegram update handlers.
//!
//! Thin adapters: classify updates (commands, documents, text), fetch
//! document bytes with download retry, and feed the conversation state
//! machine. No conversation logic lives here.

use crate::bot::transport::TelegramTransport;
use crate::config::MAX_DOCUMENT_SIZE;
use crate::conversation::{messages, ConversationMachine};
use crate::pipeline::convert::SubprocessConverter;
use crate::utils::retry_telegram_operation;
use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

/// Conversation machine wired to the live transport and converter.
pub type Engine = ConversationMachine<TelegramTransport, SubprocessConverter>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "show usage instructions")]
    Start,
    #[command(description = "cancel the current document")]
    Cancel,
}

/// Dispatch schema: commands, then documents, then plain text. The
/// conversation machine receives already-classified events only.
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.document().is_some()).endpoint(handle_document),
        )
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text))
}

/// Telegram user id, or 0 when the update carries no sender.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Username, falling back to the numeric id. Used for artifact naming.
fn display_identifier(msg: &Message) -> String {
    msg.from
        .as_ref()
        .and_then(|u| u.username.clone())
        .unwrap_or_else(|| get_user_id_safe(msg).to_string())
}

async fn handle_command(
    msg: Message,
    cmd: Command,
    engine: Arc<Engine>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let chat_id = msg.chat.id.0;
    match cmd {
        Command::Start => engine.on_start(chat_id).await,
        Command::Cancel => engine.on_cancel(user_id, chat_id).await,
    }
    respond(())
}

async fn handle_document(
    bot: Bot,
    msg: Message,
    engine: Arc<Engine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = receive_document(&bot, &msg, &engine).await {
        error!(user_id = get_user_id_safe(&msg), error = %e, "Document handler error");
        if let Err(e) = bot.send_message(msg.chat.id, messages::RECEIVE_FAILURE).await {
            error!(error = %e, "Failed to send receive-failure message");
        }
    }
    respond(())
}

async fn handle_text(msg: Message, engine: Arc<Engine>) -> Result<(), teloxide::RequestError> {
    if let Some(text) = msg.text() {
        engine
            .on_text(get_user_id_safe(&msg), msg.chat.id.0, text)
            .await;
    }
    respond(())
}

/// Download the attached document and hand it to the machine.
async fn receive_document(bot: &Bot, msg: &Message, engine: &Engine) -> Result<()> {
    let Some(doc) = msg.document() else {
        return Ok(());
    };
    let user_id = get_user_id_safe(msg);
    let file_name = doc
        .file_name
        .clone()
        .unwrap_or_else(|| "document".to_string());

    if doc.file.size > MAX_DOCUMENT_SIZE {
        anyhow::bail!(
            "file too large: {:.1} MB (max 20 MB)",
            f64::from(doc.file.size) / 1024.0 / 1024.0
        );
    }

    let buffer = retry_telegram_operation(|| async {
        let file = bot.get_file(doc.file.id.clone()).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok(buf)
    })
    .await?;

    info!(
        user_id,
        file_name = %file_name,
        size = buffer.len(),
        "Downloaded document from Telegram"
    );

    engine
        .on_document(
            user_id,
            msg.chat.id.0,
            &display_identifier(msg),
            &file_name,
            buffer,
        )
        .await;
    Ok(())
}
