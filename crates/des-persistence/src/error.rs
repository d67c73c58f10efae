//! Persistence errors: wraps `rusqlite::Error` into variants the rest of
//! the crate reasons about, then flattens into `des_core::CoreError::Store`
//! at the trait boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("row not found")]
    NotFound,

    #[error("database is locked or busy: {0}")]
    Busy(String),

    #[error("sqlite error: {0}")]
    Sqlite(String),

    #[error("no column mapping available for '{0}'")]
    MissingColumn(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => PersistenceError::NotFound,
            rusqlite::Error::SqliteFailure(sqlite_err, msg) => match sqlite_err.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    let text = msg.clone().unwrap_or_default();
                    if text.contains("UNIQUE") {
                        PersistenceError::UniqueViolation(text)
                    } else if text.contains("FOREIGN KEY") {
                        PersistenceError::ForeignKeyViolation(text)
                    } else {
                        PersistenceError::Sqlite(text)
                    }
                }
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    PersistenceError::Busy(msg.clone().unwrap_or_default())
                }
                _ => PersistenceError::Sqlite(err.to_string()),
            },
            _ => PersistenceError::Sqlite(err.to_string()),
        }
    }
}

impl From<PersistenceError> for des_core::errors::CoreError {
    fn from(err: PersistenceError) -> Self {
        des_core::errors::CoreError::Store(err.to_string())
    }
}
