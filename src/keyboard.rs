use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
    ReplyMarkup,
};

use crate::{
    database::quiz::VideoCriteria,
    event::TapAction,
    state::{Presentation, SectionSelection},
};

pub(crate) const NEW_SECTION: &str = "➕ Create a new section";
pub(crate) const CONFIRM_SECTIONS: &str = "✅ Confirm selection";
pub(crate) const SHARE_CONTACT: &str = "📱 Share contact";

/// Reply keyboards shown under the input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    Teacher,
    Student,
    ShareContact,
    Remove,
}

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherAction {
    CreateQuestion,
    ViewQuestions,
    UploadVideo,
    LaunchTest,
    Ranking,
    ResetStates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentAction {
    MyRating,
    Help,
}

impl TeacherAction {
    pub const ALL: [TeacherAction; 6] = [
        TeacherAction::CreateQuestion,
        TeacherAction::ViewQuestions,
        TeacherAction::UploadVideo,
        TeacherAction::LaunchTest,
        TeacherAction::Ranking,
        TeacherAction::ResetStates,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TeacherAction::CreateQuestion => "📝 Create question",
            TeacherAction::ViewQuestions => "📊 View questions",
            TeacherAction::UploadVideo => "🎥 Upload video",
            TeacherAction::LaunchTest => "▶️ Launch test",
            TeacherAction::Ranking => "📈 Student ranking",
            TeacherAction::ResetStates => "🔄 Reset states",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.label() == text)
    }
}

impl StudentAction {
    pub const ALL: [StudentAction; 2] = [StudentAction::MyRating, StudentAction::Help];

    pub fn label(&self) -> &'static str {
        match self {
            StudentAction::MyRating => "📊 My rating",
            StudentAction::Help => "❓ Help",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.label() == text)
    }
}

impl Choice {
    pub fn new(label: impl Into<String>, action: TapAction) -> Self {
        Self {
            label: label.into(),
            data: action.to_string(),
        }
    }
}

pub(crate) fn menu_markup(menu: Menu) -> ReplyMarkup {
    let keyboard: Vec<Vec<KeyboardButton>> = match menu {
        Menu::Teacher => vec![
            vec![KeyboardButton::new(TeacherAction::CreateQuestion.label())],
            vec![
                KeyboardButton::new(TeacherAction::ViewQuestions.label()),
                KeyboardButton::new(TeacherAction::UploadVideo.label()),
            ],
            vec![
                KeyboardButton::new(TeacherAction::LaunchTest.label()),
                KeyboardButton::new(TeacherAction::Ranking.label()),
            ],
            vec![KeyboardButton::new(TeacherAction::ResetStates.label())],
        ],
        Menu::Student => StudentAction::ALL
            .into_iter()
            .map(|action| vec![KeyboardButton::new(action.label())])
            .collect(),
        Menu::ShareContact => vec![vec![
            KeyboardButton::new(SHARE_CONTACT).request(ButtonRequest::Contact)
        ]],
        Menu::Remove => return ReplyMarkup::kb_remove(),
    };

    KeyboardMarkup::new(keyboard).into()
}

pub(crate) fn choices_markup(choices: &[Choice]) -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = choices
        .iter()
        .map(|choice| {
            vec![InlineKeyboardButton::callback(
                choice.label.clone(),
                choice.data.clone(),
            )]
        })
        .collect();

    InlineKeyboardMarkup::new(keyboard)
}

/// Sections for a new question, followed by the "new section" entry.
pub(crate) fn section_choices(sections: &[String]) -> Vec<Choice> {
    sections
        .iter()
        .enumerate()
        .map(|(idx, section)| Choice::new(section.clone(), TapAction::Section(idx)))
        .chain(std::iter::once(Choice::new(NEW_SECTION, TapAction::NewSection)))
        .collect()
}

/// Toggleable sections for a test launch. Confirmation only once something is picked.
pub(crate) fn selection_choices(sections: &[String], selection: &SectionSelection) -> Vec<Choice> {
    let mut choices: Vec<Choice> = sections
        .iter()
        .enumerate()
        .map(|(idx, section)| {
            let label = if selection.contains(section) {
                format!("✅ {section}")
            } else {
                section.clone()
            };
            Choice::new(label, TapAction::Section(idx))
        })
        .collect();

    if !selection.is_empty() {
        choices.push(Choice::new(CONFIRM_SECTIONS, TapAction::Confirm));
    }

    choices
}

pub(crate) fn answer_choices(presentation: &Presentation) -> Vec<Choice> {
    presentation
        .options()
        .map(|(index, option)| {
            Choice::new(
                format!("{}. {}", index + 1, option.text()),
                TapAction::Answer {
                    token: presentation.token,
                    index,
                },
            )
        })
        .collect()
}

pub(crate) fn criteria_choices() -> Vec<Choice> {
    VideoCriteria::ALL
        .into_iter()
        .map(|criteria| Choice::new(criteria.title(), TapAction::Video(criteria)))
        .collect()
}
