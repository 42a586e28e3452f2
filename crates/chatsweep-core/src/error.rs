use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatSweepError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Background task error: {0}")]
    Task(String),
}
