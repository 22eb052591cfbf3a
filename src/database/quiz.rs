use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    telegram_id: i64,
    first_name: String,
    last_name: String,
    phone: String,
    is_teacher: bool,
    created_at: DateTime<Utc>,
}

/// A registered student, before it reaches the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub telegram_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Question {
    id: i64,
    text: String,
    section: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AnswerOption {
    id: i64,
    question_id: i64,
    text: String,
    is_correct: bool,
}

/// A question together with its options, in the order the author typed them.
/// The first option is the correct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    text: String,
    section: String,
    options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub telegram_id: i64,
    pub question_id: i64,
    pub option_index: i32,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Score {
    pub section: String,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RankingEntry {
    pub last_name: String,
    pub first_name: String,
    pub section: String,
    pub points: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCriteria {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, FromRow)]
pub struct Video {
    id: i64,
    file_id: String,
    criteria: String,
    created_at: DateTime<Utc>,
}

/// Outcome of upserting a configured admin into the users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherPromotion {
    Created,
    Promoted,
    AlreadyTeacher,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.text, self.section)
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, if self.is_correct { 'V' } else { 'X' })
    }
}

impl fmt::Display for VideoCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCriteria {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(VideoCriteria::Success),
            "partial" => Ok(VideoCriteria::Partial),
            "failure" => Ok(VideoCriteria::Failure),
            other => Err(format!("unknown video criteria '{other}'")),
        }
    }
}

impl VideoCriteria {
    pub const ALL: [VideoCriteria; 3] = [
        VideoCriteria::Success,
        VideoCriteria::Partial,
        VideoCriteria::Failure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCriteria::Success => "success",
            VideoCriteria::Partial => "partial",
            VideoCriteria::Failure => "failure",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            VideoCriteria::Success => "Success",
            VideoCriteria::Partial => "Partial success",
            VideoCriteria::Failure => "Failure",
        }
    }

    /// Everything right is a success, nothing right is a failure.
    pub fn for_result(correct: u32, total: usize) -> Self {
        if correct == 0 {
            VideoCriteria::Failure
        } else if correct as usize >= total {
            VideoCriteria::Success
        } else {
            VideoCriteria::Partial
        }
    }
}

impl User {
    pub fn retreive(
        telegram_id: i64,
        first_name: String,
        last_name: String,
        phone: String,
        is_teacher: bool,
    ) -> Self {
        Self {
            telegram_id,
            first_name,
            last_name,
            phone,
            is_teacher,
            created_at: Utc::now(),
        }
    }

    pub fn telegram_id(&self) -> i64 {
        self.telegram_id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn is_teacher(&self) -> bool {
        self.is_teacher
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn promote(&mut self) {
        self.is_teacher = true;
    }
}

impl Question {
    pub fn retreive(id: i64, text: String, section: String) -> Self {
        Self {
            id,
            text,
            section,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl AnswerOption {
    pub fn retreive(id: i64, question_id: i64, text: String, is_correct: bool) -> Self {
        Self {
            id,
            question_id,
            text,
            is_correct,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn question_id(&self) -> i64 {
        self.question_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

impl NewQuestion {
    /// Returns `None` unless there are at least two options.
    pub fn new(text: String, section: String, options: Vec<String>) -> Option<Self> {
        if options.len() < 2 {
            return None;
        }

        Some(Self {
            text,
            section,
            options,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Options paired with their correctness flag.
    pub fn graded_options(&self) -> impl Iterator<Item = (&str, bool)> {
        self.options
            .iter()
            .enumerate()
            .map(|(position, text)| (text.as_str(), position == 0))
    }
}

impl Video {
    pub fn retreive(id: i64, file_id: String, criteria: VideoCriteria) -> Self {
        Self {
            id,
            file_id,
            criteria: criteria.as_str().to_owned(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn criteria(&self) -> Option<VideoCriteria> {
        self.criteria.parse().ok()
    }
}
