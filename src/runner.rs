use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    database::{
        quiz::{NewAnswer, Question, VideoCriteria},
        DbResult, RetreiveQuestion, Storage,
    },
    dispatch::Ctx,
    error::{FlowError, FlowResult},
    event::{Actor, Tap},
    keyboard::{answer_choices, selection_choices, Menu},
    messenger::Messenger,
    state::{FlowState, Presentation, ScratchData, SectionSelection, TestProgress},
};

/// Questions of every section in selection order, then shuffled with `seed`.
/// The same seed always yields the same order.
async fn build_pool<Db: RetreiveQuestion>(
    db: &Db,
    sections: &[String],
    seed: u64,
) -> DbResult<Vec<Question>> {
    let mut pool = Vec::new();
    for section in sections {
        pool.extend(db.retreive_questions_by_section(section).await?);
    }
    pool.shuffle(&mut StdRng::seed_from_u64(seed));
    Ok(pool)
}

#[instrument(level = "info", skip(ctx))]
pub(crate) async fn launch<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    ctx.sessions.clear(actor.user_id).await;

    let sections = ctx.db.retreive_sections().await?;
    if sections.is_empty() {
        ctx.messenger
            .send_text(
                actor.chat_id,
                "There are no sections yet. Create a question first.",
            )
            .await?;
        return Ok(());
    }

    let choices = selection_choices(&sections, &SectionSelection::default());
    ctx.sessions
        .set(
            actor.user_id,
            FlowState::SelectingSections,
            Some(ScratchData {
                offered_sections: sections,
                ..Default::default()
            }),
        )
        .await;

    ctx.messenger
        .send_choices(actor.chat_id, "Select sections for the test:", choices)
        .await?;
    Ok(())
}

#[instrument(level = "debug", skip(ctx, tap))]
pub(crate) async fn toggle_section<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    tap: &Tap,
    idx: usize,
) -> FlowResult {
    let rendered = ctx
        .sessions
        .update_data(actor.user_id, |data| {
            let section = data.offered_sections.get(idx)?.clone();
            data.selection.toggle(&section);
            Some(selection_choices(&data.offered_sections, &data.selection))
        })
        .await
        .flatten()
        .ok_or_else(FlowError::stale)?;

    ctx.messenger.answer_tap(&tap.callback_id, None, false).await?;
    if let Some(message) = tap.message_id {
        ctx.messenger
            .edit_choices(actor.chat_id, message, rendered)
            .await?;
    }
    Ok(())
}

/// Starts the test for every registered student.
#[instrument(level = "info", skip(ctx, tap))]
pub(crate) async fn confirm_sections<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    tap: &Tap,
) -> FlowResult {
    let selection = ctx.sessions.get_data(actor.user_id).await.selection;
    if selection.is_empty() {
        return Err(FlowError::Validation(
            "Select at least one section first.".into(),
        ));
    }
    let sections = selection.as_slice().to_vec();

    let students = ctx.db.retreive_all_students().await?;
    ctx.sessions.clear(actor.user_id).await;

    acknowledge(ctx, actor, tap, None).await;

    let mut started = 0;
    for student in &students {
        match start_for_student(ctx, Actor::new(student.telegram_id()), &sections).await {
            Ok(()) => started += 1,
            Err(e) => log::error!(
                "Failed to start the test for {}: {e}",
                student.telegram_id()
            ),
        }
    }
    log::info!(
        "{}: test over {:?} started for {started}/{} students",
        actor.user_id,
        sections,
        students.len()
    );

    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!(
                "▶️ Test launched for {started} of {} students.\nSections: {}",
                students.len(),
                sections.join(", ")
            ),
            Menu::Teacher,
        )
        .await?;
    Ok(())
}

async fn start_for_student<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    student: Actor,
    sections: &[String],
) -> FlowResult {
    let pool = build_pool(ctx.db, sections, rand::random()).await?;
    ctx.sessions
        .set(
            student.user_id,
            FlowState::WaitingForAnswer,
            Some(ScratchData {
                test: Some(TestProgress::new(sections.to_vec(), pool)),
                ..Default::default()
            }),
        )
        .await;

    ctx.messenger
        .send_text(
            student.chat_id,
            &format!("📢 The test is starting!\nSections: {}", sections.join(", ")),
        )
        .await?;
    present_question(ctx, student).await
}

/// Sends the question under the cursor, or the results once the pool is done.
pub(crate) async fn present_question<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
) -> FlowResult {
    let progress = ctx
        .sessions
        .get_data(actor.user_id)
        .await
        .test
        .ok_or_else(FlowError::stale)?;
    let pool = &progress.pool;

    let mut cursor = progress.cursor;
    while let Some(question) = pool.get(cursor) {
        let mut options = ctx.db.retreive_answer_options(question.id()).await?;
        if options.is_empty() {
            log::warn!("Question {} has no options, skipping", question.id());
            cursor += 1;
            continue;
        }
        options.shuffle(&mut rand::thread_rng());

        let presentation = Presentation::new(question.id(), options);
        let choices = answer_choices(&presentation);
        ctx.sessions
            .update_data(actor.user_id, |data| {
                data.test.as_mut().map(|test| {
                    test.cursor = cursor;
                    test.current = Some(presentation);
                })
            })
            .await
            .flatten()
            .ok_or_else(FlowError::stale)?;

        ctx.messenger
            .send_choices(
                actor.chat_id,
                &format!(
                    "❓ Question {} of {} [{}]\n\n{}",
                    cursor + 1,
                    pool.len(),
                    question.section(),
                    question.text()
                ),
                choices,
            )
            .await?;
        return Ok(());
    }

    finish(ctx, actor, progress.score, pool.len()).await
}

async fn finish<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    score: u32,
    total: usize,
) -> FlowResult {
    log::info!("{}: finished the test with {score}/{total}", actor.user_id);
    ctx.messenger
        .send_menu(
            actor.chat_id,
            &format!("🏁 Test finished! Correct answers: {score} of {total}."),
            Menu::Student,
        )
        .await?;

    let criteria = VideoCriteria::for_result(score, total);
    match ctx.db.retreive_random_video(criteria).await? {
        Some(video) => {
            ctx.messenger
                .send_feedback_video(actor.chat_id, video.file_id(), criteria.title())
                .await?
        }
        None => log::debug!("No {criteria} video to send"),
    }
    Ok(())
}

#[instrument(level = "info", skip(ctx, tap))]
pub(crate) async fn take_answer<Db: Storage, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    tap: &Tap,
    token: Uuid,
    index: usize,
) -> FlowResult {
    let (presentation, option, sections) = ctx
        .sessions
        .update_data(actor.user_id, |data| {
            let test = data.test.as_mut()?;
            let (presentation, option) = test.claim(token, index)?;
            Some((presentation, option, test.sections.clone()))
        })
        .await
        .flatten()
        .ok_or_else(FlowError::stale)?;

    let correct = option.is_correct();
    let answer = NewAnswer {
        telegram_id: actor.user_id,
        question_id: presentation.question_id,
        option_index: i32::try_from(index).map_err(|_| FlowError::stale())?,
        is_correct: correct,
    };
    let credited: &[String] = if correct { &sections } else { &[] };

    if let Err(e) = ctx.db.record_answer(answer, credited).await {
        ctx.sessions
            .update_data(actor.user_id, |data| {
                if let Some(test) = data.test.as_mut() {
                    test.restore(presentation);
                }
            })
            .await;
        return Err(e.into());
    }

    ctx.sessions
        .update_data(actor.user_id, |data| {
            if let Some(test) = data.test.as_mut() {
                test.advance(correct);
            }
        })
        .await;

    let note = if correct { "✅ Correct!" } else { "❌ Incorrect." };
    acknowledge(ctx, actor, tap, Some(note)).await;

    present_question(ctx, actor).await
}

/// Answers the tap and strips the buttons off its message. Telegram refuses
/// late callback answers and edits of old messages; the flow goes on anyway.
async fn acknowledge<Db, M: Messenger>(
    ctx: &Ctx<'_, Db, M>,
    actor: Actor,
    tap: &Tap,
    note: Option<&str>,
) {
    if let Err(e) = ctx.messenger.answer_tap(&tap.callback_id, note, false).await {
        log::warn!("{}: failed to answer tap {}: {e}", actor.user_id, tap.callback_id);
    }
    if let Some(message) = tap.message_id {
        if let Err(e) = ctx
            .messenger
            .edit_choices(actor.chat_id, message, Vec::new())
            .await
        {
            log::warn!("{}: failed to remove buttons of {message:?}: {e}", actor.user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use teloxide::types::MessageId;

    use super::*;
    use crate::{
        database::{memory::MemoryDatabase, quiz::VideoCriteria},
        dispatch::handle_event,
        error::STALE_TAP,
        event::{Event, TapAction},
        keyboard::{Choice, TeacherAction},
        messenger::recording::{RecordingMessenger, Sent},
        session::SessionStore,
    };

    const TEACHER: i64 = 1;
    const STUDENT: i64 = 10;

    struct Harness {
        db: MemoryDatabase,
        messenger: RecordingMessenger,
        sessions: SessionStore,
    }

    impl Harness {
        fn new() -> Self {
            let db = MemoryDatabase::new();
            db.add_teacher(TEACHER);
            db.add_student(STUDENT, "Ivanov", "Petr");
            Self {
                db,
                messenger: RecordingMessenger::new(),
                sessions: SessionStore::new(),
            }
        }

        fn ctx(&self) -> Ctx<'_, MemoryDatabase, RecordingMessenger> {
            Ctx::new(&self.db, &self.messenger, &self.sessions)
        }

        async fn send(&self, user: i64, event: Event) {
            handle_event(&self.ctx(), Actor::new(user), event).await;
        }

        async fn tap(&self, user: i64, data: impl ToString) {
            let message = self
                .messenger
                .last_choices_to(Actor::new(user).chat_id)
                .map(|(message, _)| message)
                .unwrap_or(MessageId(0));
            self.send(
                user,
                Event::Tap(Tap {
                    callback_id: format!("cb-{user}"),
                    message_id: Some(message),
                    data: data.to_string(),
                }),
            )
            .await;
        }

        /// Launches a test over the given section indexes.
        async fn launch(&self, sections: &[usize]) {
            self.send(TEACHER, Event::Text(TeacherAction::LaunchTest.label().into()))
                .await;
            for idx in sections {
                self.tap(TEACHER, TapAction::Section(*idx)).await;
            }
            self.tap(TEACHER, TapAction::Confirm).await;
        }

        fn answer_buttons(&self, user: i64) -> Vec<Choice> {
            self.messenger
                .last_choices_to(Actor::new(user).chat_id)
                .map(|(_, choices)| choices)
                .unwrap_or_default()
        }

        async fn current(&self, user: i64) -> Option<Presentation> {
            self.sessions.get_data(user).await.test?.current
        }

        /// Taps the button that leads to the correct option.
        async fn answer_correctly(&self, user: i64) {
            let presentation = self.current(user).await.unwrap();
            let (index, _) = presentation
                .options()
                .find(|(_, option)| option.is_correct())
                .unwrap();
            self.tap(
                user,
                TapAction::Answer {
                    token: presentation.token,
                    index,
                },
            )
            .await;
        }
    }

    #[tokio::test]
    async fn toggling_renders_confirm_only_with_selection() {
        let h = Harness::new();
        h.db.add_question("2+2?", "A", &["4", "5"]);
        h.db.add_question("1815?", "B", &["Waterloo", "Borodino"]);

        h.send(TEACHER, Event::Text(TeacherAction::LaunchTest.label().into()))
            .await;
        for idx in [0, 1, 0] {
            h.tap(TEACHER, TapAction::Section(idx)).await;
        }

        assert_eq!(
            h.sessions.get_data(TEACHER).await.selection.as_slice(),
            ["B".to_owned()]
        );
        let edits: Vec<Vec<Choice>> = h
            .messenger
            .sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::EditChoices { choices, .. } => Some(choices),
                _ => None,
            })
            .collect();
        assert_eq!(edits.len(), 3);
        let last = edits.last().unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[1].label, "✅ B");
        assert_eq!(last[2].data, "confirm");
    }

    #[tokio::test]
    async fn empty_confirm_alerts_and_stays() {
        let h = Harness::new();
        h.db.add_question("2+2?", "A", &["4", "5"]);

        h.send(TEACHER, Event::Text(TeacherAction::LaunchTest.label().into()))
            .await;
        h.tap(TEACHER, TapAction::Confirm).await;

        assert_eq!(
            h.sessions.get_state(TEACHER).await,
            Some(FlowState::SelectingSections)
        );
        assert_eq!(
            h.messenger.tap_notes().last().cloned().flatten().as_deref(),
            Some("Select at least one section first.")
        );
        assert_eq!(h.sessions.get_state(STUDENT).await, None);
    }

    #[tokio::test]
    async fn launch_presents_a_dense_mapping() {
        let h = Harness::new();
        let qid = h.db.add_question("Capital?", "Geo", &["Paris", "Rome", "Oslo"]);

        h.launch(&[0]).await;

        assert_eq!(h.sessions.get_state(TEACHER).await, None);
        assert_eq!(
            h.sessions.get_state(STUDENT).await,
            Some(FlowState::WaitingForAnswer)
        );

        let presentation = h.current(STUDENT).await.unwrap();
        assert_eq!(presentation.question_id, qid);
        let keys: Vec<usize> = presentation.mapping.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2]);
        let shown: HashSet<i64> = presentation.mapping.values().map(|o| o.id()).collect();
        let stored: HashSet<i64> = h.db.options_of(qid).iter().map(|o| o.id()).collect();
        assert_eq!(shown, stored);
        assert_eq!(h.answer_buttons(STUDENT).len(), 3);
    }

    #[tokio::test]
    async fn out_of_mapping_index_writes_nothing() {
        let h = Harness::new();
        h.db.add_question("Capital?", "Geo", &["Paris", "Rome"]);
        h.launch(&[0]).await;

        let presentation = h.current(STUDENT).await.unwrap();
        h.tap(
            STUDENT,
            TapAction::Answer {
                token: presentation.token,
                index: 7,
            },
        )
        .await;

        assert!(h.db.answers().is_empty());
        assert_eq!(h.db.points(STUDENT, "Geo"), 0);
        assert_eq!(
            h.messenger.tap_notes().last().cloned().flatten().as_deref(),
            Some(STALE_TAP)
        );
        assert_eq!(h.current(STUDENT).await, Some(presentation));
    }

    #[tokio::test]
    async fn correct_answers_credit_every_selected_section() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.db.add_question("b?", "S1", &["b", "x"]);
        h.db.add_question("c?", "S2", &["c", "x", "y"]);
        h.launch(&[0, 1]).await;

        for _ in 0..3 {
            h.answer_correctly(STUDENT).await;
        }

        assert_eq!(h.db.answers().len(), 3);
        assert!(h.db.answers().iter().all(|a| a.is_correct));
        assert_eq!(h.db.points(STUDENT, "S1"), 3);
        assert_eq!(h.db.points(STUDENT, "S2"), 3);
        assert_eq!(
            h.messenger.last_text_to(Actor::new(STUDENT).chat_id).as_deref(),
            Some("🏁 Test finished! Correct answers: 3 of 3.")
        );
        assert!(h.current(STUDENT).await.is_none());
    }

    #[tokio::test]
    async fn wrong_answer_is_recorded_without_points() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.launch(&[0]).await;

        let presentation = h.current(STUDENT).await.unwrap();
        let (index, _) = presentation
            .options()
            .find(|(_, option)| !option.is_correct())
            .unwrap();
        h.tap(
            STUDENT,
            TapAction::Answer {
                token: presentation.token,
                index,
            },
        )
        .await;

        let answers = h.db.answers();
        assert_eq!(answers.len(), 1);
        assert!(!answers[0].is_correct);
        assert_eq!(h.db.points(STUDENT, "S1"), 0);
        assert_eq!(
            h.messenger.tap_notes().last().cloned().flatten().as_deref(),
            Some("❌ Incorrect.")
        );
    }

    #[tokio::test]
    async fn double_tap_is_counted_once() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.db.add_question("b?", "S1", &["b", "x"]);
        h.launch(&[0]).await;

        let first = h.current(STUDENT).await.unwrap();
        let (index, _) = first.options().find(|(_, o)| o.is_correct()).unwrap();
        let replay = TapAction::Answer {
            token: first.token,
            index,
        };
        h.tap(STUDENT, replay).await;
        h.tap(STUDENT, replay).await;

        assert_eq!(h.db.answers().len(), 1);
        assert_eq!(h.db.points(STUDENT, "S1"), 1);
    }

    #[tokio::test]
    async fn replay_after_reset_is_rejected() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.launch(&[0]).await;
        let presentation = h.current(STUDENT).await.unwrap();

        h.send(TEACHER, Event::Text(TeacherAction::ResetStates.label().into()))
            .await;
        h.tap(
            STUDENT,
            TapAction::Answer {
                token: presentation.token,
                index: 0,
            },
        )
        .await;

        assert!(h.db.answers().is_empty());
        assert_eq!(
            h.messenger.tap_notes().last().cloned().flatten().as_deref(),
            Some(STALE_TAP)
        );
    }

    #[tokio::test]
    async fn failed_write_restores_the_presentation() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.launch(&[0]).await;
        let presentation = h.current(STUDENT).await.unwrap();

        h.db.fail_writes(true);
        h.answer_correctly(STUDENT).await;
        assert!(h.db.answers().is_empty());
        assert_eq!(h.current(STUDENT).await, Some(presentation));

        h.db.fail_writes(false);
        h.answer_correctly(STUDENT).await;
        assert_eq!(h.db.answers().len(), 1);
        assert_eq!(h.db.points(STUDENT, "S1"), 1);
    }

    #[tokio::test]
    async fn one_unreachable_student_does_not_stop_the_rest() {
        let h = Harness::new();
        h.db.add_student(11, "Petrov", "Ivan");
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.messenger.make_unreachable(Actor::new(STUDENT).chat_id);

        h.launch(&[0]).await;

        assert!(h.current(11).await.is_some());
        assert_eq!(
            h.messenger.last_text_to(Actor::new(TEACHER).chat_id).as_deref(),
            Some("▶️ Test launched for 1 of 2 students.\nSections: S1")
        );
    }

    #[tokio::test]
    async fn questions_without_options_are_skipped() {
        let h = Harness::new();
        h.db.add_question("empty?", "S1", &[]);
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.launch(&[0]).await;

        h.answer_correctly(STUDENT).await;

        assert_eq!(h.db.answers().len(), 1);
        assert_eq!(
            h.messenger.last_text_to(Actor::new(STUDENT).chat_id).as_deref(),
            Some("🏁 Test finished! Correct answers: 1 of 2.")
        );
    }

    #[tokio::test]
    async fn completion_sends_a_matching_video() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.db.add_video("clip-success", VideoCriteria::Success);
        h.db.add_video("clip-failure", VideoCriteria::Failure);
        h.launch(&[0]).await;

        h.answer_correctly(STUDENT).await;

        let videos: Vec<String> = h
            .messenger
            .sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Video { file_id, .. } => Some(file_id),
                _ => None,
            })
            .collect();
        assert_eq!(videos, vec!["clip-success".to_owned()]);
    }

    #[tokio::test]
    async fn uneditable_question_does_not_stall_the_test() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.db.add_question("b?", "S1", &["b", "x"]);
        h.launch(&[0]).await;
        h.messenger.freeze_messages(Actor::new(STUDENT).chat_id);

        h.answer_correctly(STUDENT).await;

        assert_eq!(h.db.answers().len(), 1);
        assert!(h.current(STUDENT).await.is_some());
        let questions = h
            .messenger
            .texts_to(Actor::new(STUDENT).chat_id)
            .into_iter()
            .filter(|text| text.starts_with("❓"))
            .count();
        assert_eq!(questions, 2);

        h.answer_correctly(STUDENT).await;
        assert_eq!(
            h.messenger.last_text_to(Actor::new(STUDENT).chat_id).as_deref(),
            Some("🏁 Test finished! Correct answers: 2 of 2.")
        );
    }

    #[tokio::test]
    async fn expired_confirm_tap_still_starts_the_test() {
        let h = Harness::new();
        h.db.add_question("a?", "S1", &["a", "x"]);
        h.messenger.expire_taps();
        h.messenger.freeze_messages(Actor::new(TEACHER).chat_id);

        h.launch(&[0]).await;

        assert!(h.current(STUDENT).await.is_some());
        assert_eq!(
            h.messenger.last_text_to(Actor::new(TEACHER).chat_id).as_deref(),
            Some("▶️ Test launched for 1 of 1 students.\nSections: S1")
        );
    }

    #[tokio::test]
    async fn questions_added_mid_test_keep_the_order() {
        let h = Harness::new();
        for n in 0..6 {
            h.db.add_question(&format!("q{n}?"), "S1", &["y", "n"]);
        }
        h.launch(&[0]).await;
        let pool: Vec<i64> = h
            .sessions
            .get_data(STUDENT)
            .await
            .test
            .unwrap()
            .pool
            .iter()
            .map(Question::id)
            .collect();

        for _ in 0..3 {
            h.answer_correctly(STUDENT).await;
        }
        h.db.add_question("late?", "S1", &["y", "n"]);
        for _ in 0..3 {
            h.answer_correctly(STUDENT).await;
        }

        let asked: Vec<i64> = h.db.answers().iter().map(|a| a.question_id).collect();
        assert_eq!(asked, pool);
        assert_eq!(
            h.messenger.last_text_to(Actor::new(STUDENT).chat_id).as_deref(),
            Some("🏁 Test finished! Correct answers: 6 of 6.")
        );
    }

    #[tokio::test]
    async fn pool_order_is_fixed_by_seed() {
        let db = MemoryDatabase::new();
        for n in 0..8 {
            db.add_question(&format!("q{n}"), if n % 2 == 0 { "A" } else { "B" }, &["y", "n"]);
        }
        let sections = vec!["B".to_owned(), "A".to_owned()];

        let ids = |pool: Vec<Question>| pool.iter().map(Question::id).collect::<Vec<_>>();
        let first = ids(build_pool(&db, &sections, 42).await.unwrap());
        let second = ids(build_pool(&db, &sections, 42).await.unwrap());

        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
    }
}
