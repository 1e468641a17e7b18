//! Telegram delivery of runtime notices

use super::render;
use crate::runtime::{Delivery, Notifier};
use std::future::Future;
use teloxide::payloads::setters::*;
use teloxide::requests::Requester;
use teloxide::types::{ChatId, MessageId};
use teloxide::{ApiError, Bot, RequestError};
use tokio::sync::mpsc;

/// Sends notices through the Bot API. Deliveries are queued to one sender
/// task, so the runtime loop never waits on the network and each user
/// sees notices in the order they were produced.
#[derive(Clone)]
pub struct TelegramNotifier {
    queue: mpsc::UnboundedSender<Delivery>,
}

impl TelegramNotifier {
    /// Must be called from within a tokio runtime
    pub fn new(bot: Bot) -> Self {
        let queue = spawn_sender(move |delivery: Delivery| {
            let bot = bot.clone();
            async move { deliver(&bot, &delivery).await }
        });
        Self { queue }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, delivery: Delivery) {
        if let Err(e) = self.queue.send(delivery) {
            tracing::warn!(user_id = %e.0.user_id, "Notice sender stopped, dropping notice");
        }
    }
}

/// Drain the queue one delivery at a time. The task ends once every
/// sender is dropped.
fn spawn_sender<F, Fut>(mut send: F) -> mpsc::UnboundedSender<Delivery>
where
    F: FnMut(Delivery) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), RequestError>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
    tokio::spawn(async move {
        while let Some(delivery) = rx.recv().await {
            let user_id = delivery.user_id;
            let notice = delivery.notice;
            match send(delivery).await {
                Ok(()) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        notice = ?notice,
                        error = %e,
                        "Failed to deliver notice"
                    );
                }
            }
        }
    });
    tx
}

/// Edit the originating message when there is one, else send a new one
async fn deliver(bot: &Bot, delivery: &Delivery) -> Result<(), RequestError> {
    let chat_id = ChatId(delivery.user_id.0);
    let text = render::text(&delivery.notice);
    let keyboard = render::keyboard(&delivery.notice);

    match delivery.edit_message {
        Some(message_id) => {
            let request = bot.edit_message_text(chat_id, MessageId(message_id), text);
            match keyboard {
                Some(markup) => request.reply_markup(markup).await?,
                None => request.await?,
            };
        }
        None => {
            let request = bot.send_message(chat_id, text);
            match keyboard {
                Some(markup) => request.reply_markup(markup).await?,
                None => request.await?,
            };
        }
    }
    Ok(())
}
