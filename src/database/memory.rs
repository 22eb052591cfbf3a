//! In-process stand-in for the Postgres connection, used by the flow tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use rand::seq::SliceRandom;

use super::connection::{
    CreateQuestion, CreateUser, DbResult, RecordAnswer, RetreiveQuestion, RetreiveUser,
    ScoreLedger, StoreVideo,
};
use super::quiz::{
    AnswerOption, NewAnswer, NewQuestion, NewUser, Question, RankingEntry, Score,
    TeacherPromotion, User, Video, VideoCriteria,
};
use super::DatabaseError;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    questions: Vec<Question>,
    options: Vec<AnswerOption>,
    answers: Vec<NewAnswer>,
    scores: Vec<(i64, String, i32)>,
    videos: Vec<Video>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub(crate) struct MemoryDatabase {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemoryDatabase {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail until switched back.
    pub(crate) fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> DbResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DatabaseError::Unavailable("writes disabled".into()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn add_student(&self, telegram_id: i64, last_name: &str, first_name: &str) {
        self.tables.lock().unwrap().users.push(User::retreive(
            telegram_id,
            first_name.into(),
            last_name.into(),
            "+100".into(),
            false,
        ));
    }

    pub(crate) fn add_teacher(&self, telegram_id: i64) {
        self.tables.lock().unwrap().users.push(User::retreive(
            telegram_id,
            "Teacher".into(),
            "Admin".into(),
            String::new(),
            true,
        ));
    }

    pub(crate) fn add_question(&self, text: &str, section: &str, options: &[&str]) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let question_id = tables.next_id();
        tables
            .questions
            .push(Question::retreive(question_id, text.into(), section.into()));
        for (position, option) in options.iter().enumerate() {
            let option_id = tables.next_id();
            tables.options.push(AnswerOption::retreive(
                option_id,
                question_id,
                (*option).into(),
                position == 0,
            ));
        }
        question_id
    }

    pub(crate) fn add_video(&self, file_id: &str, criteria: VideoCriteria) {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        tables.videos.push(Video::retreive(id, file_id.into(), criteria));
    }

    pub(crate) fn users(&self) -> Vec<User> {
        self.tables.lock().unwrap().users.clone()
    }

    pub(crate) fn questions(&self) -> Vec<Question> {
        self.tables.lock().unwrap().questions.clone()
    }

    pub(crate) fn options_of(&self, question_id: i64) -> Vec<AnswerOption> {
        self.tables
            .lock()
            .unwrap()
            .options
            .iter()
            .filter(|option| option.question_id() == question_id)
            .cloned()
            .collect()
    }

    pub(crate) fn answers(&self) -> Vec<NewAnswer> {
        self.tables.lock().unwrap().answers.clone()
    }

    pub(crate) fn points(&self, telegram_id: i64, section: &str) -> i32 {
        self.tables
            .lock()
            .unwrap()
            .scores
            .iter()
            .find(|(user, s, _)| *user == telegram_id && s == section)
            .map(|(_, _, points)| *points)
            .unwrap_or_default()
    }

    pub(crate) fn videos(&self) -> Vec<Video> {
        self.tables.lock().unwrap().videos.clone()
    }
}

fn bump(tables: &mut Tables, telegram_id: i64, section: &str) {
    match tables
        .scores
        .iter_mut()
        .find(|(user, s, _)| *user == telegram_id && s == section)
    {
        Some((_, _, points)) => *points += 1,
        None => tables.scores.push((telegram_id, section.to_owned(), 1)),
    }
}

impl CreateUser for MemoryDatabase {
    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.telegram_id() == user.telegram_id) {
            return Err(DatabaseError::Unavailable("duplicate telegram id".into()));
        }
        let created = User::retreive(
            user.telegram_id,
            user.first_name,
            user.last_name,
            user.phone,
            false,
        );
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn promote_teacher(&self, telegram_id: i64) -> DbResult<TeacherPromotion> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        match tables.users.iter_mut().find(|u| u.telegram_id() == telegram_id) {
            Some(user) if user.is_teacher() => Ok(TeacherPromotion::AlreadyTeacher),
            Some(user) => {
                user.promote();
                Ok(TeacherPromotion::Promoted)
            }
            None => {
                tables.users.push(User::retreive(
                    telegram_id,
                    "Teacher".into(),
                    "Admin".into(),
                    String::new(),
                    true,
                ));
                Ok(TeacherPromotion::Created)
            }
        }
    }
}

impl RetreiveUser for MemoryDatabase {
    async fn retreive_user(&self, telegram_id: i64) -> DbResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|u| u.telegram_id() == telegram_id)
            .cloned())
    }

    async fn retreive_all_students(&self) -> DbResult<Vec<User>> {
        let tables = self.tables.lock().unwrap();
        let mut students: Vec<User> = tables
            .users
            .iter()
            .filter(|u| !u.is_teacher())
            .cloned()
            .collect();
        students.sort_by(|a, b| {
            (a.last_name(), a.first_name()).cmp(&(b.last_name(), b.first_name()))
        });
        Ok(students)
    }
}

impl CreateQuestion for MemoryDatabase {
    async fn create_question(&self, question: NewQuestion) -> DbResult<Question> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        let question_id = tables.next_id();
        let created = Question::retreive(
            question_id,
            question.text().to_owned(),
            question.section().to_owned(),
        );
        tables.questions.push(created.clone());
        for (text, is_correct) in question.graded_options() {
            let option_id = tables.next_id();
            tables.options.push(AnswerOption::retreive(
                option_id,
                question_id,
                text.to_owned(),
                is_correct,
            ));
        }
        Ok(created)
    }
}

impl RetreiveQuestion for MemoryDatabase {
    async fn retreive_sections(&self) -> DbResult<Vec<String>> {
        let tables = self.tables.lock().unwrap();
        let mut sections: Vec<String> = Vec::new();
        for question in &tables.questions {
            if !sections.iter().any(|s| s == question.section()) {
                sections.push(question.section().to_owned());
            }
        }
        Ok(sections)
    }

    async fn retreive_questions_by_section(&self, section: &str) -> DbResult<Vec<Question>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .questions
            .iter()
            .filter(|q| q.section() == section)
            .cloned()
            .collect())
    }

    async fn retreive_answer_options(&self, question_id: i64) -> DbResult<Vec<AnswerOption>> {
        Ok(self.options_of(question_id))
    }
}

impl RecordAnswer for MemoryDatabase {
    async fn record_answer(&self, answer: NewAnswer, credited_sections: &[String]) -> DbResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.iter().any(|u| u.telegram_id() == answer.telegram_id) {
            return Err(DatabaseError::UnknownUser(answer.telegram_id));
        }
        for section in credited_sections {
            bump(&mut tables, answer.telegram_id, section);
        }
        tables.answers.push(answer);
        Ok(())
    }
}

impl ScoreLedger for MemoryDatabase {
    async fn retreive_user_scores(&self, telegram_id: i64) -> DbResult<Vec<Score>> {
        let tables = self.tables.lock().unwrap();
        let mut scores: Vec<Score> = tables
            .scores
            .iter()
            .filter(|(user, _, _)| *user == telegram_id)
            .map(|(_, section, points)| Score {
                section: section.clone(),
                points: *points,
            })
            .collect();
        scores.sort_by(|a, b| a.section.cmp(&b.section));
        Ok(scores)
    }

    async fn retreive_all_scores(&self) -> DbResult<Vec<RankingEntry>> {
        let tables = self.tables.lock().unwrap();
        let mut ranking: Vec<RankingEntry> = tables
            .scores
            .iter()
            .filter_map(|(user, section, points)| {
                let student = tables
                    .users
                    .iter()
                    .find(|u| u.telegram_id() == *user && !u.is_teacher())?;
                Some(RankingEntry {
                    last_name: student.last_name().to_owned(),
                    first_name: student.first_name().to_owned(),
                    section: section.clone(),
                    points: *points,
                })
            })
            .collect();
        ranking.sort_by(|a, b| {
            (&a.last_name, &a.first_name, &a.section).cmp(&(&b.last_name, &b.first_name, &b.section))
        });
        Ok(ranking)
    }
}

impl StoreVideo for MemoryDatabase {
    async fn save_video(&self, file_id: &str, criteria: VideoCriteria) -> DbResult<Video> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let video = Video::retreive(id, file_id.to_owned(), criteria);
        tables.videos.push(video.clone());
        Ok(video)
    }

    async fn retreive_random_video(&self, criteria: VideoCriteria) -> DbResult<Option<Video>> {
        let tables = self.tables.lock().unwrap();
        let matching: Vec<&Video> = tables
            .videos
            .iter()
            .filter(|v| v.criteria() == Some(criteria))
            .collect();
        Ok(matching.choose(&mut rand::thread_rng()).map(|v| (*v).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(telegram_id: i64, question_id: i64, is_correct: bool) -> NewAnswer {
        NewAnswer {
            telegram_id,
            question_id,
            option_index: 0,
            is_correct,
        }
    }

    #[tokio::test]
    async fn credits_keep_one_row_per_section() {
        let db = MemoryDatabase::new();
        db.add_student(7, "Ivanov", "Petr");
        let question = db.add_question("Q1", "Math", &["a", "b"]);
        let both = ["Math".to_owned(), "History".to_owned()];

        db.record_answer(answer(7, question, true), &both).await.unwrap();
        db.record_answer(answer(7, question, true), &both[..1]).await.unwrap();
        db.record_answer(answer(7, question, false), &[]).await.unwrap();

        let scores = db.retreive_user_scores(7).await.unwrap();
        assert_eq!(
            scores,
            vec![
                Score { section: "History".into(), points: 1 },
                Score { section: "Math".into(), points: 2 },
            ]
        );
        assert_eq!(db.answers().len(), 3);
    }

    #[tokio::test]
    async fn unknown_users_cannot_answer() {
        let db = MemoryDatabase::new();
        let question = db.add_question("Q1", "Math", &["a", "b"]);

        let result = db.record_answer(answer(99, question, true), &["Math".into()]).await;

        assert!(matches!(result, Err(DatabaseError::UnknownUser(99))));
        assert!(db.answers().is_empty());
        assert_eq!(db.points(99, "Math"), 0);
    }
}
