use std::{collections::BTreeMap, fmt};

use uuid::Uuid;

use crate::database::quiz::{AnswerOption, Question};

/// Where a user currently is in a conversation. No session at all means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowState {
    // PART FOR --- REGISTRATION ---
    WaitingForName,
    WaitingForContact,

    // PART FOR --- AUTHORING ---
    WaitingForQuestion,
    WaitingForSection,
    WaitingForNewSection,
    WaitingForAnswers,

    // PART FOR --- VIDEOS ---
    WaitingForVideo,
    WaitingForVideoCriteria,

    // PART FOR --- TESTING ---
    SelectingSections,
    WaitingForAnswer,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::WaitingForName => "waiting_for_name",
            FlowState::WaitingForContact => "waiting_for_contact",
            FlowState::WaitingForQuestion => "waiting_for_question",
            FlowState::WaitingForSection => "waiting_for_section",
            FlowState::WaitingForNewSection => "waiting_for_new_section",
            FlowState::WaitingForAnswers => "waiting_for_answers",
            FlowState::WaitingForVideo => "waiting_for_video",
            FlowState::WaitingForVideoCriteria => "waiting_for_video_criteria",
            FlowState::SelectingSections => "selecting_sections",
            FlowState::WaitingForAnswer => "waiting_for_answer",
        };
        f.write_str(name)
    }
}

/// Values carried between the steps of a flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScratchData {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub question_text: Option<String>,
    pub section: Option<String>,
    pub video_file_id: Option<String>,
    /// Sections in the order they were rendered; taps refer to them by index.
    pub offered_sections: Vec<String>,
    pub selection: SectionSelection,
    pub test: Option<TestProgress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub state: FlowState,
    pub data: ScratchData,
}

/// A set of sections that remembers the order they were picked in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionSelection(Vec<String>);

impl SectionSelection {
    /// Adds the section when absent, removes it when present. Returns whether it
    /// ends up selected.
    pub fn toggle(&mut self, section: &str) -> bool {
        match self.0.iter().position(|s| s == section) {
            Some(idx) => {
                self.0.remove(idx);
                false
            }
            None => {
                self.0.push(section.to_owned());
                true
            }
        }
    }

    pub fn contains(&self, section: &str) -> bool {
        self.0.iter().any(|s| s == section)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// One student's progress through a launched test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestProgress {
    pub sections: Vec<String>,
    /// Questions in the order they are asked, fixed when the test starts.
    pub pool: Vec<Question>,
    pub cursor: usize,
    pub score: u32,
    pub current: Option<Presentation>,
}

/// The question currently on screen and the options behind its buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub token: Uuid,
    pub question_id: i64,
    pub mapping: BTreeMap<usize, AnswerOption>,
}

impl TestProgress {
    pub fn new(sections: Vec<String>, pool: Vec<Question>) -> Self {
        Self {
            sections,
            pool,
            cursor: 0,
            score: 0,
            current: None,
        }
    }

    /// Takes the current presentation if the tap belongs to it. A tap for another
    /// presentation or an unknown index leaves everything untouched.
    pub fn claim(&mut self, token: Uuid, index: usize) -> Option<(Presentation, AnswerOption)> {
        let option = self
            .current
            .as_ref()
            .filter(|presentation| presentation.token == token)?
            .mapping
            .get(&index)?
            .clone();

        self.current.take().map(|presentation| (presentation, option))
    }

    /// Puts a claimed presentation back, unless a newer one took its place.
    pub fn restore(&mut self, presentation: Presentation) {
        if self.current.is_none() {
            self.current = Some(presentation);
        }
    }

    pub fn advance(&mut self, correct: bool) {
        self.cursor += 1;
        if correct {
            self.score += 1;
        }
    }
}

impl Presentation {
    pub fn new(question_id: i64, options: Vec<AnswerOption>) -> Self {
        Self {
            token: Uuid::new_v4(),
            question_id,
            mapping: options.into_iter().enumerate().collect(),
        }
    }

    pub fn options(&self) -> impl Iterator<Item = (usize, &AnswerOption)> {
        self.mapping.iter().map(|(idx, option)| (*idx, option))
    }
}
