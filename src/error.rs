use thiserror::Error;

#[derive(Error, Debug)]
pub enum SprintError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Highscore Store Error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Logging Error: {0}")]
    Logging(String),

    #[error("Terminal Error: {0}")]
    Terminal(String),
}

pub type SprintResult<T> = Result<T, SprintError>;
