use teloxide::{
    payloads::setters::*,
    prelude::Requester,
    types::{ChatId, InputFile, MessageId},
    ApiError, Bot, RequestError,
};

use crate::keyboard::{choices_markup, menu_markup, Choice, Menu};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("telegram request failed: {0}")]
    Request(#[from] RequestError),

    #[error("chat {0} is unreachable")]
    Unreachable(ChatId),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Everything the flows send back to users.
pub trait Messenger {
    async fn send_text(&self, chat: ChatId, text: &str) -> DeliveryResult<()>;

    async fn send_menu(&self, chat: ChatId, text: &str, menu: Menu) -> DeliveryResult<()>;

    async fn send_choices(
        &self,
        chat: ChatId,
        text: &str,
        choices: Vec<Choice>,
    ) -> DeliveryResult<MessageId>;

    /// Replaces the buttons of a sent message. No choices removes them.
    async fn edit_choices(
        &self,
        chat: ChatId,
        message: MessageId,
        choices: Vec<Choice>,
    ) -> DeliveryResult<()>;

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> DeliveryResult<()>;

    async fn answer_tap(
        &self,
        callback_id: &str,
        note: Option<&str>,
        alert: bool,
    ) -> DeliveryResult<()>;

    async fn send_feedback_video(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> DeliveryResult<()>;
}

fn ignore_not_modified<T>(result: Result<T, RequestError>) -> DeliveryResult<()> {
    match result {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Messenger for Bot {
    async fn send_text(&self, chat: ChatId, text: &str) -> DeliveryResult<()> {
        self.send_message(chat, text).await?;
        Ok(())
    }

    async fn send_menu(&self, chat: ChatId, text: &str, menu: Menu) -> DeliveryResult<()> {
        self.send_message(chat, text)
            .reply_markup(menu_markup(menu))
            .await?;
        Ok(())
    }

    async fn send_choices(
        &self,
        chat: ChatId,
        text: &str,
        choices: Vec<Choice>,
    ) -> DeliveryResult<MessageId> {
        let sent = self
            .send_message(chat, text)
            .reply_markup(choices_markup(&choices))
            .await?;
        Ok(sent.id)
    }

    async fn edit_choices(
        &self,
        chat: ChatId,
        message: MessageId,
        choices: Vec<Choice>,
    ) -> DeliveryResult<()> {
        let request = self.edit_message_reply_markup(chat, message);
        let result = if choices.is_empty() {
            request.await
        } else {
            request.reply_markup(choices_markup(&choices)).await
        };
        ignore_not_modified(result)
    }

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> DeliveryResult<()> {
        ignore_not_modified(self.edit_message_text(chat, message, text).await)
    }

    async fn answer_tap(
        &self,
        callback_id: &str,
        note: Option<&str>,
        alert: bool,
    ) -> DeliveryResult<()> {
        let mut request = self.answer_callback_query(callback_id.to_owned()).show_alert(alert);
        if let Some(note) = note {
            request = request.text(note);
        }
        request.await?;
        Ok(())
    }

    async fn send_feedback_video(
        &self,
        chat: ChatId,
        file_id: &str,
        caption: &str,
    ) -> DeliveryResult<()> {
        self.send_video(chat, InputFile::file_id(file_id.to_owned()))
            .caption(caption)
            .await?;
        Ok(())
    }
}
