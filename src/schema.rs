use std::sync::Arc;

use teloxide::{
    dispatching::{UpdateFilterExt, UpdateHandler},
    dptree,
    types::{CallbackQuery, Message, Update},
    Bot,
};
use tracing::instrument;

use crate::{
    commands::Command,
    database::connection::Connection,
    dispatch::{handle_event, Ctx},
    event::{Actor, Event, Tap},
    session::SessionStore,
    HandlerResult,
};

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    log::debug!("Building the dispatch tree");

    let command_handler = teloxide::filter_command::<Command, _>().endpoint(on_command);

    let message_handler = Update::filter_message()
        .filter(is_private)
        .branch(command_handler)
        .endpoint(on_message);

    let callback_handler = Update::filter_callback_query().endpoint(on_callback);

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}

/// Users are keyed by chat id, so only one-to-one chats are served.
fn is_private(msg: Message) -> bool {
    if !msg.chat.is_private() {
        log::debug!("Ignoring an update from non-private chat {}", msg.chat.id);
        return false;
    }
    true
}

fn message_event(msg: &Message) -> Event {
    if let Some(contact) = msg.contact() {
        Event::Contact {
            owner: contact.user_id.map(|id| id.0 as i64),
            phone: contact.phone_number.clone(),
        }
    } else if let Some(video) = msg.video() {
        Event::Video {
            file_id: video.file.id.to_string(),
        }
    } else if let Some(text) = msg.text() {
        Event::Text(text.to_owned())
    } else {
        Event::Other
    }
}

async fn deliver(
    bot: &Bot,
    connection: &Connection,
    sessions: &SessionStore,
    actor: Actor,
    event: Event,
) -> HandlerResult {
    let ctx = Ctx::new(connection, bot, sessions);
    handle_event(&ctx, actor, event).await;
    Ok(())
}

#[instrument(level = "debug", skip(bot, msg, connection, sessions))]
async fn on_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    connection: Arc<Connection>,
    sessions: Arc<SessionStore>,
) -> HandlerResult {
    let actor = Actor::new(msg.chat.id.0);
    deliver(&bot, &connection, &sessions, actor, Event::Command(cmd)).await
}

#[instrument(level = "debug", skip_all)]
async fn on_message(
    bot: Bot,
    msg: Message,
    connection: Arc<Connection>,
    sessions: Arc<SessionStore>,
) -> HandlerResult {
    let actor = Actor::new(msg.chat.id.0);
    deliver(&bot, &connection, &sessions, actor, message_event(&msg)).await
}

#[instrument(level = "debug", skip_all)]
async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    connection: Arc<Connection>,
    sessions: Arc<SessionStore>,
) -> HandlerResult {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };

    let actor = Actor::new(q.from.id.0 as i64);
    let tap = Tap {
        callback_id: q.id.to_string(),
        message_id: q.message.as_ref().map(|message| message.id()),
        data,
    };
    deliver(&bot, &connection, &sessions, actor, Event::Tap(tap)).await
}
