use async_trait::async_trait;
use engine::{CollaboratorError, Notice, Notifier};
use teloxide::{prelude::*, types::ChatId};

use crate::ui;

/// Sends notices as plain messages to the group chat, whose id is the
/// group id.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: teloxide::Bot,
}

impl TelegramNotifier {
    pub(crate) fn from_bot(bot: teloxide::Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, entity_id: i64, notice: &Notice) -> Result<(), CollaboratorError> {
        let text = ui::render_notice(notice);
        self.bot
            .send_message(ChatId(entity_id), text)
            .await
            .map(|_| ())
            .map_err(|err| CollaboratorError::Failed(err.to_string()))
    }
}
