use tracing::instrument;

use crate::{
    database::{quiz::NewQuestion, Storage},
    dispatch::Ctx,
    error::{FlowError, FlowResult},
    event::{Actor, Tap, TapAction},
    keyboard::{section_choices, Menu},
    messenger::Messenger,
    state::{FlowState, ScratchData},
};

const QUESTION_PROMPT: &str = "Enter the question text:";
const SECTION_NAME_PROMPT: &str = "Enter the name of the new section:";
const ANSWERS_PROMPT: &str = "Send the answer options, one per line (at least two). \
     The first line is the correct answer.";

pub(crate) async fn begin<Db, M: Messenger>(ctx: &Ctx<'_, Db, M>, actor: Actor) -> FlowResult {
    ctx.sessions
        .set(
            actor.user_id,
            FlowState::WaitingForQuestion,
            Some(ScratchData::default()),
        )
        .await;

    ctx.messenger
        .send_text(actor.chat_id, &format!("📝 New question.\n{QUESTION_PROMPT}"))
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn receive_question<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    text: &str,
) -> FlowResult {
    let text = text.trim();
    if text.is_empty() {
        return Err(FlowError::Validation(QUESTION_PROMPT.into()));
    }

    let sections = ctx.db.retreive_sections().await?;
    let choices = section_choices(&sections);

    ctx.sessions
        .set(
            actor.user_id,
            FlowState::WaitingForSection,
            Some(ScratchData {
                question_text: Some(text.to_owned()),
                offered_sections: sections,
                ..Default::default()
            }),
        )
        .await;

    ctx.messenger
        .send_choices(
            actor.chat_id,
            "Choose a section for the question or create a new one:",
            choices,
        )
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx, tap))]
pub(crate) async fn choose_section<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    tap: &Tap,
    action: TapAction,
) -> FlowResult {
    let reply = match action {
        TapAction::NewSection => {
            ctx.sessions
                .set(actor.user_id, FlowState::WaitingForNewSection, None)
                .await;
            SECTION_NAME_PROMPT.to_owned()
        }
        TapAction::Section(idx) => {
            let section = ctx
                .sessions
                .update_data(actor.user_id, |data| {
                    let section = data.offered_sections.get(idx).cloned();
                    data.section.clone_from(&section);
                    section
                })
                .await
                .flatten()
                .ok_or_else(FlowError::stale)?;

            ctx.sessions
                .set(actor.user_id, FlowState::WaitingForAnswers, None)
                .await;
            format!("Section: {section}\n{ANSWERS_PROMPT}")
        }
        _ => return Err(FlowError::stale()),
    };

    ctx.messenger.answer_tap(&tap.callback_id, None, false).await?;
    if let Some(message) = tap.message_id {
        ctx.messenger
            .edit_choices(actor.chat_id, message, Vec::new())
            .await?;
    }
    ctx.messenger.send_text(actor.chat_id, &reply).await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn receive_new_section<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    text: &str,
) -> FlowResult {
    let section = text.trim();
    if section.is_empty() {
        return Err(FlowError::Validation(SECTION_NAME_PROMPT.into()));
    }

    ctx.sessions
        .update_data(actor.user_id, |data| data.section = Some(section.to_owned()))
        .await
        .ok_or_else(FlowError::stale)?;
    ctx.sessions
        .set(actor.user_id, FlowState::WaitingForAnswers, None)
        .await;

    ctx.messenger
        .send_text(actor.chat_id, &format!("Section: {section}\n{ANSWERS_PROMPT}"))
        .await?;
    Ok(())
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn receive_answers<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    text: &str,
) -> FlowResult {
    let options: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    let data = ctx.sessions.get_data(actor.user_id).await;
    let (Some(question_text), Some(section)) = (data.question_text, data.section) else {
        ctx.sessions.clear(actor.user_id).await;
        return Err(FlowError::NotFound(
            "The question draft was lost. Please create the question again.".into(),
        ));
    };

    let question = NewQuestion::new(question_text, section, options)
        .ok_or_else(|| FlowError::Validation(ANSWERS_PROMPT.into()))?;
    let saved = ctx.db.create_question(question).await?;

    log::info!("{}: created question {}", actor.user_id, saved);
    ctx.sessions.clear(actor.user_id).await;

    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!("✅ Question saved in section «{}»!", saved.section()),
            Menu::Teacher,
        )
        .await?;
    Ok(())
}
