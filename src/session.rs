use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::state::{FlowState, ScratchData, Session};

/// Conversation state of every user that is in the middle of a flow.
///
/// Lives in process memory only. Every operation holds the store lock for its
/// whole duration, so a mutator passed to [`SessionStore::update_data`] is never
/// observed half-applied.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the user to `state`. Without `data` the current scratch data is kept.
    pub async fn set(&self, user_id: i64, state: FlowState, data: Option<ScratchData>) {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&user_id) {
            Some(session) => {
                session.state = state;
                if let Some(data) = data {
                    session.data = data;
                }
            }
            None => {
                sessions.insert(
                    user_id,
                    Session {
                        state,
                        data: data.unwrap_or_default(),
                    },
                );
            }
        }
    }

    pub async fn get_state(&self, user_id: i64) -> Option<FlowState> {
        self.sessions
            .lock()
            .await
            .get(&user_id)
            .map(|session| session.state)
    }

    /// A copy of the scratch data; empty when the user has no session.
    pub async fn get_data(&self, user_id: i64) -> ScratchData {
        self.sessions
            .lock()
            .await
            .get(&user_id)
            .map(|session| session.data.clone())
            .unwrap_or_default()
    }

    pub async fn get(&self, user_id: i64) -> Option<Session> {
        self.sessions.lock().await.get(&user_id).cloned()
    }

    /// Runs `mutator` on the user's scratch data. Returns `None` when there is no
    /// session to update.
    pub async fn update_data<R>(
        &self,
        user_id: i64,
        mutator: impl FnOnce(&mut ScratchData) -> R,
    ) -> Option<R> {
        self.sessions
            .lock()
            .await
            .get_mut(&user_id)
            .map(|session| mutator(&mut session.data))
    }

    pub async fn clear(&self, user_id: i64) {
        self.sessions.lock().await.remove(&user_id);
    }

    /// Drops every session. Returns how many there were.
    pub async fn clear_all(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let dropped = sessions.len();
        sessions.clear();
        dropped
    }
}
