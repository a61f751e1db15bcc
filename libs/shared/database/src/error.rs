use thiserror::Error;

/// Failure reported by the backing store. Callers propagate it unchanged.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// PostgREST answers a unique index violation (SQLSTATE 23505) with 409.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => StoreError::Auth(body),
            404 => StoreError::NotFound(body),
            409 => StoreError::UniqueViolation(body),
            _ if body.contains("\"23505\"") => StoreError::UniqueViolation(body),
            _ => StoreError::Api { status, body },
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}
