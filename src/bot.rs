//! Telegram transport
//!
//! Maps chat updates onto runtime commands. The chat id is the user id;
//! the bot is meant for private chats.

mod notifier;
pub mod render;

pub use notifier::TelegramNotifier;

use crate::db::UserId;
use crate::runtime::{Command, RuntimeHandle};
use crate::state_machine::Trigger;
use teloxide::dispatching::{DefaultKey, Dispatcher, UpdateFilterExt, UpdateHandler};
use teloxide::dptree;
use teloxide::requests::Requester;
use teloxide::types::{CallbackQuery, Message, Update};
use teloxide::Bot;

type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type HandlerResult = Result<(), HandlerError>;

/// Build the long-polling dispatcher
pub fn dispatcher(bot: Bot, runtime: RuntimeHandle) -> Dispatcher<Bot, HandlerError, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![runtime])
        .default_handler(|update| async move {
            tracing::debug!(update_id = ?update.id, "Ignoring unhandled update");
        })
        .build()
}

fn schema() -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback))
}

async fn on_message(msg: Message, runtime: RuntimeHandle) -> HandlerResult {
    if msg.text().is_some_and(is_start_command) {
        let user_id = UserId(msg.chat.id.0);
        tracing::debug!(user_id = %user_id, "Start command");
        runtime.send(Command::new(user_id, Trigger::ShowMenu)).await?;
    }
    Ok(())
}

async fn on_callback(bot: Bot, query: CallbackQuery, runtime: RuntimeHandle) -> HandlerResult {
    // Always stop the client-side spinner, even for ignored presses
    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
        tracing::warn!(error = %e, "Failed to answer callback query");
    }

    let Some(message) = query.message.as_ref() else {
        return Ok(());
    };
    let Some(trigger) = query.data.as_deref().and_then(parse_callback) else {
        tracing::debug!(data = ?query.data, "Unknown callback data");
        return Ok(());
    };

    let command = Command::new(UserId(message.chat().id.0), trigger).with_origin(message.id().0);
    runtime.send(command).await?;
    Ok(())
}

/// `/start`, `/start@botname` or `/start <payload>`
fn is_start_command(text: &str) -> bool {
    let Some(command) = text.split_whitespace().next() else {
        return false;
    };
    let name = command.split('@').next().unwrap_or(command);
    name == "/start"
}

/// Map inline button data onto a trigger
pub fn parse_callback(data: &str) -> Option<Trigger> {
    if let Some(minutes) = data.strip_prefix(render::INTERVAL_PREFIX) {
        return minutes
            .parse()
            .ok()
            .map(|minutes| Trigger::ChooseInterval { minutes });
    }
    match data {
        render::SCHEDULE => Some(Trigger::OpenSchedule),
        render::RECORD_EVENT => Some(Trigger::RecordEvent),
        render::MARK_DONE => Some(Trigger::MarkDone),
        render::START_DAY => Some(Trigger::StartDay),
        render::STOP_SCHEDULE => Some(Trigger::Stop),
        _ => None,
    }
}
