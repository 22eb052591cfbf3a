use std::borrow::Cow;

use sqlx::postgres::{PgPool, PgPoolOptions};

use super::quiz::{
    AnswerOption, NewAnswer, NewQuestion, NewUser, Question, RankingEntry, Score,
    TeacherPromotion, User, Video, VideoCriteria,
};
use super::DatabaseError;

pub type DbResult<T> = Result<T, DatabaseError>;

const USER_COLUMNS: &str = "telegram_id, first_name, last_name, phone, is_teacher, created_at";

const INCREMENT_SCORE: &str = "INSERT INTO scores (user_id, section, points) VALUES ($1, $2, 1) \
     ON CONFLICT (user_id, section) DO UPDATE SET points = scores.points + 1 RETURNING points";

pub struct Connection {
    pool: PgPool,
}

impl Connection {
    pub async fn connect(connection_string: Cow<'_, str>) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await?;
        Ok(Self { pool })
    }

    pub async fn perform_migrations(&self) -> DbResult<()> {
        log::debug!("Running migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

pub trait CreateUser {
    async fn create_user(&self, user: NewUser) -> DbResult<User>;

    /// Creates the user as a teacher, or flips the flag on an existing one.
    async fn promote_teacher(&self, telegram_id: i64) -> DbResult<TeacherPromotion>;
}

pub trait RetreiveUser {
    async fn retreive_user(&self, telegram_id: i64) -> DbResult<Option<User>>;

    /// Non-teachers ordered by last name, then first name.
    async fn retreive_all_students(&self) -> DbResult<Vec<User>>;
}

pub trait CreateQuestion {
    /// Inserts the question and all of its options, or nothing.
    async fn create_question(&self, question: NewQuestion) -> DbResult<Question>;
}

pub trait RetreiveQuestion {
    /// Distinct section labels in the order they first appeared.
    async fn retreive_sections(&self) -> DbResult<Vec<String>>;

    async fn retreive_questions_by_section(&self, section: &str) -> DbResult<Vec<Question>>;

    async fn retreive_answer_options(&self, question_id: i64) -> DbResult<Vec<AnswerOption>>;
}

pub trait RecordAnswer {
    /// Appends the answer and adds a point to each credited section in one transaction.
    async fn record_answer(&self, answer: NewAnswer, credited_sections: &[String]) -> DbResult<()>;
}

pub trait ScoreLedger {
    async fn retreive_user_scores(&self, telegram_id: i64) -> DbResult<Vec<Score>>;

    /// Student scores ordered by last name, first name and section.
    async fn retreive_all_scores(&self) -> DbResult<Vec<RankingEntry>>;
}

pub trait StoreVideo {
    async fn save_video(&self, file_id: &str, criteria: VideoCriteria) -> DbResult<Video>;

    async fn retreive_random_video(&self, criteria: VideoCriteria) -> DbResult<Option<Video>>;
}

impl CreateUser for Connection {
    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (telegram_id, first_name, last_name, phone, is_teacher) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.telegram_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .fetch_one(&self.pool)
        .await?;

        log::info!("Created user {}", created.telegram_id());
        Ok(created)
    }

    async fn promote_teacher(&self, telegram_id: i64) -> DbResult<TeacherPromotion> {
        let mut tx = self.pool.begin().await?;

        let is_teacher =
            sqlx::query_scalar::<_, bool>("SELECT is_teacher FROM users WHERE telegram_id = $1")
                .bind(telegram_id)
                .fetch_optional(&mut *tx)
                .await?;

        let promotion = match is_teacher {
            None => {
                sqlx::query(
                    "INSERT INTO users (telegram_id, first_name, last_name, phone, is_teacher) \
                     VALUES ($1, 'Teacher', 'Admin', '', TRUE)",
                )
                .bind(telegram_id)
                .execute(&mut *tx)
                .await?;
                TeacherPromotion::Created
            }
            Some(false) => {
                sqlx::query("UPDATE users SET is_teacher = TRUE WHERE telegram_id = $1")
                    .bind(telegram_id)
                    .execute(&mut *tx)
                    .await?;
                TeacherPromotion::Promoted
            }
            Some(true) => TeacherPromotion::AlreadyTeacher,
        };

        tx.commit().await?;
        Ok(promotion)
    }
}

impl RetreiveUser for Connection {
    async fn retreive_user(&self, telegram_id: i64) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = $1"
        ))
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn retreive_all_students(&self) -> DbResult<Vec<User>> {
        let students = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE NOT is_teacher ORDER BY last_name, first_name"
        ))
        .fetch_all(&self.pool)
        .await?;

        log::info!("Retreived {} students", students.len());
        Ok(students)
    }
}

impl CreateQuestion for Connection {
    async fn create_question(&self, question: NewQuestion) -> DbResult<Question> {
        log::debug!("Creating transaction");
        let mut tx = self.pool.begin().await?;

        log::debug!("Adding question");
        let created = sqlx::query_as::<_, Question>(
            "INSERT INTO questions (text, section) VALUES ($1, $2) \
             RETURNING id, text, section, created_at",
        )
        .bind(question.text())
        .bind(question.section())
        .fetch_one(&mut *tx)
        .await?;

        log::debug!("Adding answer options");
        for (text, is_correct) in question.graded_options() {
            sqlx::query(
                "INSERT INTO answer_options (question_id, text, is_correct) VALUES ($1, $2, $3)",
            )
            .bind(created.id())
            .bind(text)
            .bind(is_correct)
            .execute(&mut *tx)
            .await?;
        }

        log::debug!("Closing transaction");
        tx.commit().await?;

        log::info!("Created question {} in section '{}'", created.id(), created.section());
        Ok(created)
    }
}

impl RetreiveQuestion for Connection {
    async fn retreive_sections(&self) -> DbResult<Vec<String>> {
        let sections = sqlx::query_scalar::<_, String>(
            "SELECT section FROM questions GROUP BY section ORDER BY MIN(id)",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sections)
    }

    async fn retreive_questions_by_section(&self, section: &str) -> DbResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, text, section, created_at FROM questions \
             WHERE section = $1 ORDER BY created_at, id",
        )
        .bind(section)
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }

    async fn retreive_answer_options(&self, question_id: i64) -> DbResult<Vec<AnswerOption>> {
        let options = sqlx::query_as::<_, AnswerOption>(
            "SELECT id, question_id, text, is_correct FROM answer_options \
             WHERE question_id = $1 ORDER BY id",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        log::debug!("Retreived {} answer options for question {}", options.len(), question_id);
        Ok(options)
    }
}

impl RecordAnswer for Connection {
    async fn record_answer(&self, answer: NewAnswer, credited_sections: &[String]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let user_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE telegram_id = $1")
            .bind(answer.telegram_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DatabaseError::UnknownUser(answer.telegram_id))?;

        sqlx::query(
            "INSERT INTO answers (user_id, question_id, option_index, is_correct) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(answer.question_id)
        .bind(answer.option_index)
        .bind(answer.is_correct)
        .execute(&mut *tx)
        .await?;

        for section in credited_sections {
            let points = sqlx::query_scalar::<_, i32>(INCREMENT_SCORE)
                .bind(user_id)
                .bind(section)
                .fetch_one(&mut *tx)
                .await?;
            log::debug!(
                "Score of {} in section '{}' is now {}",
                answer.telegram_id,
                section,
                points
            );
        }

        tx.commit().await?;
        Ok(())
    }
}

impl ScoreLedger for Connection {
    async fn retreive_user_scores(&self, telegram_id: i64) -> DbResult<Vec<Score>> {
        let scores = sqlx::query_as::<_, Score>(
            "SELECT s.section, s.points FROM scores s INNER JOIN users u ON u.id = s.user_id \
             WHERE u.telegram_id = $1 ORDER BY s.section",
        )
        .bind(telegram_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(scores)
    }

    async fn retreive_all_scores(&self) -> DbResult<Vec<RankingEntry>> {
        let ranking = sqlx::query_as::<_, RankingEntry>(
            "SELECT u.last_name, u.first_name, s.section, s.points \
             FROM scores s INNER JOIN users u ON u.id = s.user_id \
             WHERE NOT u.is_teacher ORDER BY u.last_name, u.first_name, s.section",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ranking)
    }
}

impl StoreVideo for Connection {
    async fn save_video(&self, file_id: &str, criteria: VideoCriteria) -> DbResult<Video> {
        let video = sqlx::query_as::<_, Video>(
            "INSERT INTO videos (file_id, criteria) VALUES ($1, $2) \
             RETURNING id, file_id, criteria, created_at",
        )
        .bind(file_id)
        .bind(criteria.as_str())
        .fetch_one(&self.pool)
        .await?;

        log::info!("Saved video {} with criteria {}", video.file_id(), criteria);
        Ok(video)
    }

    async fn retreive_random_video(&self, criteria: VideoCriteria) -> DbResult<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(
            "SELECT id, file_id, criteria, created_at FROM videos \
             WHERE criteria = $1 ORDER BY RANDOM() LIMIT 1",
        )
        .bind(criteria.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(video)
    }
}
