use std::{fmt, str::FromStr};

use teloxide::types::{ChatId, MessageId};
use uuid::Uuid;

use crate::{commands::Command, database::quiz::VideoCriteria};

/// Who sent an update. Private chats only, so the chat is the user's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub chat_id: ChatId,
}

impl Actor {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            chat_id: ChatId(user_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command(Command),
    Text(String),
    Contact {
        owner: Option<i64>,
        phone: String,
    },
    Video {
        file_id: String,
    },
    Tap(Tap),
    /// Anything else a user can send (stickers, photos...).
    Other,
}

/// A press on an inline button.
#[derive(Debug, Clone, PartialEq)]
pub struct Tap {
    pub callback_id: String,
    pub message_id: Option<MessageId>,
    pub data: String,
}

/// What an inline button means, as carried in its callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    Section(usize),
    NewSection,
    Confirm,
    Video(VideoCriteria),
    Answer { token: Uuid, index: usize },
}

impl Event {
    pub fn tap(&self) -> Option<&Tap> {
        match self {
            Event::Tap(tap) => Some(tap),
            _ => None,
        }
    }
}

impl fmt::Display for TapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapAction::Section(idx) => write!(f, "section:{idx}"),
            TapAction::NewSection => f.write_str("section:new"),
            TapAction::Confirm => f.write_str("confirm"),
            TapAction::Video(criteria) => write!(f, "video:{criteria}"),
            TapAction::Answer { token, index } => write!(f, "answer:{token}:{index}"),
        }
    }
}

impl FromStr for TapAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("unknown callback data '{s}'");
        let (kind, rest) = s.split_once(':').unwrap_or((s, ""));

        match kind {
            "section" if rest == "new" => Ok(TapAction::NewSection),
            "section" => rest
                .parse()
                .map(TapAction::Section)
                .map_err(|_| invalid()),
            "confirm" if rest.is_empty() => Ok(TapAction::Confirm),
            "video" => rest.parse().map(TapAction::Video),
            "answer" => {
                let (token, index) = rest.split_once(':').ok_or_else(invalid)?;
                Ok(TapAction::Answer {
                    token: token.parse().map_err(|_| invalid())?,
                    index: index.parse().map_err(|_| invalid())?,
                })
            }
            _ => Err(invalid()),
        }
    }
}
