use tracing::instrument;

use crate::{
    database::{quiz::NewUser, CreateUser, Storage},
    dispatch::Ctx,
    error::{FlowError, FlowResult},
    event::Actor,
    keyboard::Menu,
    messenger::Messenger,
    state::{FlowState, ScratchData},
};

pub(crate) const NAME_PROMPT: &str =
    "Please enter your last name and first name separated by a space (for example: Ivanov Petr).";
pub(crate) const CONTACT_PROMPT: &str = "Please share your contact using the button below.";
const OWN_CONTACT_ONLY: &str = "Please share your own contact using the button below.";

/// Splits "last first [middle...]" into the last name and the rest.
fn split_name(text: &str) -> Option<(String, String)> {
    let mut tokens = text.split_whitespace();
    let last_name = tokens.next()?;
    let first_name = tokens.collect::<Vec<_>>().join(" ");

    if first_name.is_empty() {
        None
    } else {
        Some((last_name.to_owned(), first_name))
    }
}

pub(crate) async fn begin<Db, M: Messenger>(ctx: &Ctx<'_, Db, M>, actor: Actor) -> FlowResult {
    ctx.sessions
        .set(
            actor.user_id,
            FlowState::WaitingForName,
            Some(ScratchData::default()),
        )
        .await;

    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!("👋 Welcome! Let's get you registered.\n{NAME_PROMPT}"),
            Menu::Remove,
        )
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn receive_name<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    text: &str,
) -> FlowResult {
    let (last_name, first_name) =
        split_name(text).ok_or_else(|| FlowError::Validation(NAME_PROMPT.into()))?;

    log::info!("{}: registering as {last_name} {first_name}", actor.user_id);

    let reply = format!("Thank you, {first_name}! {CONTACT_PROMPT}");
    ctx.sessions
        .set(
            actor.user_id,
            FlowState::WaitingForContact,
            Some(ScratchData {
                last_name: Some(last_name),
                first_name: Some(first_name),
                ..Default::default()
            }),
        )
        .await;

    ctx.messenger
        .send_menu(actor.chat_id, &reply, Menu::ShareContact)
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx, phone))]
pub(crate) async fn receive_contact<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    owner: Option<i64>,
    phone: &str,
) -> FlowResult {
    if owner != Some(actor.user_id) {
        return Err(FlowError::Validation(OWN_CONTACT_ONLY.into()));
    }

    let data = ctx.sessions.get_data(actor.user_id).await;
    let (Some(last_name), Some(first_name)) = (data.last_name, data.first_name) else {
        ctx.sessions.clear(actor.user_id).await;
        return Err(FlowError::NotFound(
            "Registration data was lost. Please start again with /start.".into(),
        ));
    };

    let user = ctx
        .db
        .create_user(NewUser {
            telegram_id: actor.user_id,
            first_name,
            last_name,
            phone: phone.to_owned(),
        })
        .await?;
    ctx.sessions.clear(actor.user_id).await;

    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!(
                "✅ Registration complete, {} {}! Wait for your teacher to launch a test.",
                user.last_name(),
                user.first_name()
            ),
            Menu::Student,
        )
        .await?;
    Ok(())
}

/// Makes every configured admin a teacher. Unparseable ids are skipped.
/// Returns how many ids were applied.
pub async fn register_teachers<Db: CreateUser>(db: &Db, admin_ids: &[String]) -> usize {
    let mut applied = 0;

    for raw in admin_ids {
        let Ok(telegram_id) = raw.trim().parse::<i64>() else {
            log::warn!("Skipping invalid admin id '{raw}'");
            continue;
        };

        match db.promote_teacher(telegram_id).await {
            Ok(promotion) => {
                log::info!("Admin {telegram_id}: {promotion:?}");
                applied += 1;
            }
            Err(e) => log::error!("Failed to register admin {telegram_id}: {e}"),
        }
    }

    applied
}
