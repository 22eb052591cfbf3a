use teloxide::utils::command::BotCommands;
use tracing::instrument;

use crate::{
    database::Storage,
    dispatch::{Ctx, Role},
    error::FlowResult,
    event::Actor,
    keyboard::Menu,
    messenger::Messenger,
    registration,
};

#[derive(Debug, Clone, PartialEq, Eq, BotCommands)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "start the bot or register.")]
    Start,
    #[command(description = "open the teacher panel.")]
    Teacher,
    #[command(description = "display help.")]
    Help,
    #[command(description = "cancel the current action.")]
    Cancel,
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn start<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    role: Role,
) -> FlowResult {
    match role {
        Role::Teacher => teacher_panel(ctx, actor).await,
        Role::Student => {
            let name = ctx
                .db
                .retreive_user(actor.user_id)
                .await?
                .map(|user| user.first_name().to_owned())
                .unwrap_or_default();
            ctx.messenger
                .send_menu(
                    actor.chat_id,
                    &format!("👋 Welcome back, {name}!"),
                    Menu::Student,
                )
                .await?;
            Ok(())
        }
        Role::Guest => registration::begin(ctx, actor).await,
    }
}

pub(crate) async fn help<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    role: Role,
) -> FlowResult {
    let usage = match role {
        Role::Teacher => {
            "Use the teacher panel to create questions, upload feedback videos and launch tests."
        }
        Role::Student => {
            "When your teacher launches a test, questions appear here. Tap an answer to reply. \
             \"My rating\" shows your points per section."
        }
        Role::Guest => "Send /start to register.",
    };

    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!("{}\n\n{usage}", Command::descriptions()),
            role.menu(),
        )
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn cancel<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    role: Role,
) -> FlowResult {
    ctx.sessions.clear(actor.user_id).await;
    ctx.messenger
        .send_menu(actor.chat_id, "Action cancelled.", role.menu())
        .await?;
    Ok(())
}

pub(crate) async fn teacher_panel<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    ctx.messenger
        .send_menu(actor.chat_id, "👨‍🏫 Teacher panel:", Menu::Teacher)
        .await?;
    Ok(())
}
