//! Routing of inbound events to flow steps.
//!
//! [`route`] is the single table deciding which step handles an event, keyed by
//! the sender's role, their conversation state and the kind of event. Reply
//! menu labels are matched before the state, so a menu button always works.

use tracing::instrument;
use uuid::Uuid;

use crate::{
    commands::{self, Command},
    constructor,
    database::{quiz::VideoCriteria, DbResult, RetreiveUser, Storage},
    error::{FlowError, FlowResult},
    event::{Actor, Event, Tap, TapAction},
    keyboard::{Menu, StudentAction, TeacherAction},
    menu,
    messenger::Messenger,
    registration::{self, CONTACT_PROMPT, NAME_PROMPT},
    runner,
    session::SessionStore,
    state::FlowState,
};

const UNHANDLED: &str = "Unable to handle the message. Enter /help to see usages.";

/// Everything a flow step works with.
pub struct Ctx<'a, Db, M> {
    pub db: &'a Db,
    pub messenger: &'a M,
    pub sessions: &'a SessionStore,
}

impl<'a, Db, M> Ctx<'a, Db, M> {
    pub fn new(db: &'a Db, messenger: &'a M, sessions: &'a SessionStore) -> Self {
        Self {
            db,
            messenger,
            sessions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
    Guest,
}

impl Role {
    pub async fn resolve<Db: RetreiveUser>(db: &Db, user_id: i64) -> DbResult<Self> {
        Ok(match db.retreive_user(user_id).await? {
            Some(user) if user.is_teacher() => Role::Teacher,
            Some(_) => Role::Student,
            None => Role::Guest,
        })
    }

    pub fn menu(self) -> Menu {
        match self {
            Role::Teacher => Menu::Teacher,
            Role::Student => Menu::Student,
            Role::Guest => Menu::Remove,
        }
    }
}

/// The flow step an event resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<'e> {
    Start,
    Help,
    Cancel,
    TeacherPanel,
    Teacher(TeacherAction),
    Student(StudentAction),
    Name(&'e str),
    Contact { owner: Option<i64>, phone: &'e str },
    Question(&'e str),
    Section(&'e Tap, TapAction),
    NewSection(&'e str),
    Answers(&'e str),
    Video(&'e str),
    Criteria(&'e Tap, VideoCriteria),
    Toggle(&'e Tap, usize),
    Confirm(&'e Tap),
    Answer(&'e Tap, Uuid, usize),
    /// Input that does not fit the current step; the prompt is repeated.
    Reprompt(&'static str),
    /// A button from a flow that is no longer running.
    Stale,
    Denied,
    Unhandled,
}

fn is_teacher_state(state: FlowState) -> bool {
    matches!(
        state,
        FlowState::WaitingForQuestion
            | FlowState::WaitingForSection
            | FlowState::WaitingForNewSection
            | FlowState::WaitingForAnswers
            | FlowState::WaitingForVideo
            | FlowState::WaitingForVideoCriteria
            | FlowState::SelectingSections
    )
}

pub fn route(role: Role, state: Option<FlowState>, event: &Event) -> Step<'_> {
    use FlowState::*;

    match event {
        Event::Command(Command::Start) => return Step::Start,
        Event::Command(Command::Help) => return Step::Help,
        Event::Command(Command::Cancel) => return Step::Cancel,
        Event::Command(Command::Teacher) if role == Role::Teacher => return Step::TeacherPanel,
        Event::Command(Command::Teacher) => return Step::Denied,
        Event::Text(text) => match role {
            Role::Teacher => {
                if let Some(action) = TeacherAction::from_label(text) {
                    return Step::Teacher(action);
                }
            }
            _ if TeacherAction::from_label(text).is_some() => return Step::Denied,
            Role::Student => {
                if let Some(action) = StudentAction::from_label(text) {
                    return Step::Student(action);
                }
            }
            Role::Guest => {}
        },
        _ => {}
    }

    let Some(state) = state else {
        return match event {
            Event::Tap(_) => Step::Stale,
            _ => Step::Unhandled,
        };
    };

    if is_teacher_state(state) && role != Role::Teacher {
        return Step::Denied;
    }

    let action = event.tap().and_then(|tap| tap.data.parse::<TapAction>().ok());

    match (state, event, action) {
        (WaitingForName, Event::Text(text), _) => Step::Name(text),
        (WaitingForName, _, _) => Step::Reprompt(NAME_PROMPT),

        (WaitingForContact, Event::Contact { owner, phone }, _) => Step::Contact {
            owner: *owner,
            phone,
        },
        (WaitingForContact, _, _) => Step::Reprompt(CONTACT_PROMPT),

        (WaitingForQuestion, Event::Text(text), _) => Step::Question(text),
        (WaitingForQuestion, _, _) => Step::Reprompt("Send the question text."),

        (
            WaitingForSection,
            Event::Tap(tap),
            Some(action @ (TapAction::Section(_) | TapAction::NewSection)),
        ) => Step::Section(tap, action),
        (WaitingForSection, _, _) => {
            Step::Reprompt("Choose a section with the buttons above.")
        }

        (WaitingForNewSection, Event::Text(text), _) => Step::NewSection(text),
        (WaitingForNewSection, _, _) => Step::Reprompt("Send the name of the new section."),

        (WaitingForAnswers, Event::Text(text), _) => Step::Answers(text),
        (WaitingForAnswers, _, _) => {
            Step::Reprompt("Send the answer options as text, one per line.")
        }

        (WaitingForVideo, Event::Video { file_id }, _) => Step::Video(file_id),
        (WaitingForVideo, _, _) => Step::Reprompt(menu::VIDEO_PROMPT),

        (WaitingForVideoCriteria, Event::Tap(tap), Some(TapAction::Video(criteria))) => {
            Step::Criteria(tap, criteria)
        }
        (WaitingForVideoCriteria, _, _) => {
            Step::Reprompt("Choose the criteria with the buttons above.")
        }

        (SelectingSections, Event::Tap(tap), Some(TapAction::Section(idx))) => {
            Step::Toggle(tap, idx)
        }
        (SelectingSections, Event::Tap(tap), Some(TapAction::Confirm)) => Step::Confirm(tap),
        (SelectingSections, _, _) => {
            Step::Reprompt("Select sections with the buttons above.")
        }

        (WaitingForAnswer, Event::Tap(tap), Some(TapAction::Answer { token, index })) => {
            Step::Answer(tap, token, index)
        }
        (WaitingForAnswer, Event::Tap(_), _) => Step::Stale,
        (WaitingForAnswer, _, _) => {
            Step::Reprompt("Answer with the buttons under the question.")
        }
    }
}

/// Runs the step an event routes to. Failures are reported to the user and
/// never leave this function.
#[instrument(level = "debug", skip(ctx))]
pub async fn handle_event<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    event: Event,
) {
    if let Err(err) = run(ctx, actor, &event).await {
        report(ctx, actor, &event, err).await;
    }
}

async fn run<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    event: &Event,
) -> FlowResult {
    let role = Role::resolve(ctx.db, actor.user_id).await?;
    let state = ctx.sessions.get_state(actor.user_id).await;
    let step = route(role, state, event);
    log::debug!(
        "{}: {role:?} in {} -> {step:?}",
        actor.user_id,
        state.map_or_else(|| "idle".to_owned(), |s| s.to_string())
    );

    match step {
        Step::Start => commands::start(ctx, actor, role).await,
        Step::Help => commands::help(ctx, actor, role).await,
        Step::Cancel => commands::cancel(ctx, actor, role).await,
        Step::TeacherPanel => commands::teacher_panel(ctx, actor).await,
        Step::Teacher(action) => match action {
            TeacherAction::CreateQuestion => constructor::begin(ctx, actor).await,
            TeacherAction::ViewQuestions => menu::view_questions(ctx, actor).await,
            TeacherAction::UploadVideo => menu::upload_video(ctx, actor).await,
            TeacherAction::LaunchTest => runner::launch(ctx, actor).await,
            TeacherAction::Ranking => menu::ranking(ctx, actor).await,
            TeacherAction::ResetStates => menu::reset_states(ctx, actor).await,
        },
        Step::Student(StudentAction::MyRating) => menu::my_rating(ctx, actor).await,
        Step::Student(StudentAction::Help) => commands::help(ctx, actor, role).await,
        Step::Name(text) => registration::receive_name(ctx, actor, text).await,
        Step::Contact { owner, phone } => {
            registration::receive_contact(ctx, actor, owner, phone).await
        }
        Step::Question(text) => constructor::receive_question(ctx, actor, text).await,
        Step::Section(tap, action) => constructor::choose_section(ctx, actor, tap, action).await,
        Step::NewSection(text) => constructor::receive_new_section(ctx, actor, text).await,
        Step::Answers(text) => constructor::receive_answers(ctx, actor, text).await,
        Step::Video(file_id) => menu::receive_video(ctx, actor, file_id).await,
        Step::Criteria(tap, criteria) => menu::choose_criteria(ctx, actor, tap, criteria).await,
        Step::Toggle(tap, idx) => runner::toggle_section(ctx, actor, tap, idx).await,
        Step::Confirm(tap) => runner::confirm_sections(ctx, actor, tap).await,
        Step::Answer(tap, token, index) => {
            runner::take_answer(ctx, actor, tap, token, index).await
        }
        Step::Reprompt(prompt) => Err(FlowError::Validation(prompt.into())),
        Step::Stale => Err(FlowError::stale()),
        Step::Denied => Err(FlowError::Access),
        Step::Unhandled => {
            ctx.messenger.send_text(actor.chat_id, UNHANDLED).await?;
            Ok(())
        }
    }
}

/// Tells the user what went wrong: as a tap acknowledgement for button
/// presses, as a chat message otherwise.
async fn report<Db, M: Messenger>(ctx: &Ctx<'_, Db, M>, actor: Actor, event: &Event, err: FlowError) {
    match &err {
        FlowError::Validation(_) | FlowError::NotFound(_) | FlowError::Access => {
            log::info!("{}: {err}", actor.user_id)
        }
        FlowError::Persistence(_) | FlowError::Delivery(_) => {
            log::error!("{}: {err}", actor.user_id)
        }
    }

    let Some(text) = err.user_message() else {
        return;
    };
    let delivered = match event.tap() {
        Some(tap) => ctx.messenger.answer_tap(&tap.callback_id, Some(text), true).await,
        None => ctx.messenger.send_text(actor.chat_id, text).await,
    };
    if let Err(e) = delivered {
        log::error!("{}: failed to report an error: {e}", actor.user_id);
    }
}
