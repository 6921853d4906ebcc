use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrototypeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File operation failed: {0}")]
    FsExtra(#[from] fs_extra::error::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid pattern: {reason}")]
    Pattern { reason: String },

    #[error("Router table error: {reason}")]
    RouterTable { reason: String },

    #[error("Routes '{first}' and '{second}' both map to {filename}.html")]
    RouteCollision {
        filename: String,
        first: String,
        second: String,
    },

    #[error("Output directory error: {reason}")]
    OutputDirectory { reason: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Generation failed: {reason}")]
    Generation { reason: String },

    #[error("HTTP status error: {status}")]
    HttpStatus { status: u16 },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PrototypeError>;
