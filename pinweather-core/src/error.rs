use thiserror::Error;

/// Failure of a remote lookup (weather, geocoding or seed list).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} request failed with status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid {endpoint} response: {message}")]
    Body {
        endpoint: &'static str,
        message: String,
    },

    #[error("HTTP client could not be built: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Short message suitable for showing next to a search box.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Transport { .. } | FetchError::Client(_) => {
                "Could not reach the weather service.".to_string()
            }
            FetchError::Status { status: 404, .. } => "City not found.".to_string(),
            FetchError::Status { status, .. } => {
                format!("Weather service returned an error ({status}).")
            }
            FetchError::Body { .. } => "Weather service sent an unreadable response.".to_string(),
        }
    }
}

/// Failure of the local city store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported schema version {0}")]
    UnsupportedSchema(i64),

    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;
