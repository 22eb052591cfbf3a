use std::fmt::Write;

use tracing::instrument;

use crate::{
    database::{quiz::VideoCriteria, Storage},
    dispatch::Ctx,
    error::{FlowError, FlowResult},
    event::{Actor, Tap},
    keyboard::{criteria_choices, Menu},
    messenger::Messenger,
    state::{FlowState, ScratchData},
};

pub(crate) const VIDEO_PROMPT: &str = "Send the feedback video.";

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn view_questions<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    let sections = ctx.db.retreive_sections().await?;
    if sections.is_empty() {
        ctx.messenger
            .send_text(actor.chat_id, "No questions yet.")
            .await?;
        return Ok(());
    }

    let mut listing = String::from("📊 Questions:\n");
    for section in &sections {
        let questions = ctx.db.retreive_questions_by_section(section).await?;
        let _ = write!(listing, "\n📚 {section}:\n");
        for (number, question) in questions.iter().enumerate() {
            let _ = writeln!(listing, "{}. {}", number + 1, question.text());
        }
    }

    ctx.messenger.send_text(actor.chat_id, &listing).await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn ranking<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    let scores = ctx.db.retreive_all_scores().await?;
    if scores.is_empty() {
        ctx.messenger
            .send_text(actor.chat_id, "No results yet.")
            .await?;
        return Ok(());
    }

    let mut table = String::from("📈 Student ranking:\n");
    for entry in &scores {
        let _ = writeln!(
            table,
            "{} {} | {}: {}",
            entry.last_name, entry.first_name, entry.section, entry.points
        );
    }

    ctx.messenger.send_text(actor.chat_id, &table).await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn reset_states<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    let dropped = ctx.sessions.clear_all().await;
    log::info!("{}: reset {dropped} sessions", actor.user_id);

    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!("🔄 All states have been reset ({dropped} cleared)."),
            Menu::Teacher,
        )
        .await?;
    Ok(())
}

pub(crate) async fn upload_video<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    ctx.sessions
        .set(
            actor.user_id,
            FlowState::WaitingForVideo,
            Some(ScratchData::default()),
        )
        .await;
    ctx.messenger.send_text(actor.chat_id, VIDEO_PROMPT).await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn receive_video<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    file_id: &str,
) -> FlowResult {
    ctx.sessions
        .set(
            actor.user_id,
            FlowState::WaitingForVideoCriteria,
            Some(ScratchData {
                video_file_id: Some(file_id.to_owned()),
                ..Default::default()
            }),
        )
        .await;

    ctx.messenger
        .send_choices(
            actor.chat_id,
            "When should this video be shown?",
            criteria_choices(),
        )
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx, tap))]
pub(crate) async fn choose_criteria<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    tap: &Tap,
    criteria: VideoCriteria,
) -> FlowResult {
    let file_id = ctx
        .sessions
        .get_data(actor.user_id)
        .await
        .video_file_id
        .ok_or_else(FlowError::stale)?;

    let video = ctx.db.save_video(&file_id, criteria).await?;
    log::info!("{}: saved video {} as {criteria}", actor.user_id, video.file_id());
    ctx.sessions.clear(actor.user_id).await;

    ctx.messenger.answer_tap(&tap.callback_id, None, false).await?;
    let confirmation = format!("✅ Video saved for «{}».", criteria.title());
    match tap.message_id {
        Some(message) => {
            ctx.messenger
                .edit_text(actor.chat_id, message, &confirmation)
                .await?
        }
        None => ctx.messenger.send_text(actor.chat_id, &confirmation).await?,
    }
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn my_rating<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    let scores = ctx.db.retreive_user_scores(actor.user_id).await?;
    if scores.is_empty() {
        ctx.messenger
            .send_text(actor.chat_id, "You don't have any points yet.")
            .await?;
        return Ok(());
    }

    let mut rating = String::from("📊 Your rating:\n");
    for score in &scores {
        let _ = writeln!(rating, "{}: {}", score.section, score.points);
    }

    ctx.messenger.send_text(actor.chat_id, &rating).await?;
    Ok(())
}
