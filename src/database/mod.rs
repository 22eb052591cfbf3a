pub mod connection;
#[cfg(test)]
pub(crate) mod memory;
pub mod quiz;

pub use connection::{
    Connection, CreateQuestion, CreateUser, DbResult, RecordAnswer, RetreiveQuestion,
    RetreiveUser, ScoreLedger, StoreVideo,
};

/// Everything the flows need from persistence.
pub trait Storage:
    CreateUser + RetreiveUser + CreateQuestion + RetreiveQuestion + RecordAnswer + ScoreLedger + StoreVideo
{
}

impl<T> Storage for T where
    T: CreateUser
        + RetreiveUser
        + CreateQuestion
        + RetreiveQuestion
        + RecordAnswer
        + ScoreLedger
        + StoreVideo
{
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("no user with telegram id {0}")]
    UnknownUser(i64),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
