use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Shared by every error enum in this crate so each can be turned into an
/// HTTP response without duplicating the logging/JSON-envelope boilerplate.
pub trait ResponseError: std::error::Error {
    fn format_err(&self, status: StatusCode) -> axum::response::Response {
        let json = serde_json::json!({ "error": self.to_string() });
        tracing::error!("request failed: {}, {:?}", status, self);
        (status, axum::Json(json)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unknown backend scheme: `{0}`")]
    UnknownBackend(String),
    #[error("migration not found: `{0}`")]
    MigrationNotFound(String),
    #[error("invalid migration request: {0}")]
    InvalidMigrationRequest(String),
}

impl ResponseError for ClientError {}

impl IntoResponse for &ClientError {
    fn into_response(self) -> axum::response::Response {
        use ClientError::*;
        match self {
            UnknownBackend(_) => self.format_err(StatusCode::BAD_REQUEST),
            MigrationNotFound(_) => self.format_err(StatusCode::NOT_FOUND),
            InvalidMigrationRequest(_) => self.format_err(StatusCode::BAD_REQUEST),
        }
    }
}

impl IntoResponse for ClientError {
    fn into_response(self) -> axum::response::Response {
        (&self).into_response()
    }
}

/// Non-fatal: the caller downgrades to a fallback (unlinked Sat/Link) and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("more than two fields match the foreign-key pattern: {0:?}")]
    TooManyForeignKeys(Vec<String>),
}

/// Fatal for the current request: the caller aborts and rejects the message with no requeue.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("source database unavailable: {0}")]
    SourceUnavailable(String),
    #[error("graph store unavailable: {0}")]
    GraphUnavailable(String),
    #[error("audit store unavailable: {0}")]
    AuditUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("classification error: {0}")]
    Classification(#[from] ClassificationError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    // Dedicated for most generic internal errors. Consider a dedicated variant instead.
    #[error("internal error: `{0}`")]
    Internal(String),
    // Catch-all error since we lean on anyhow in a few places.
    #[error("internal error: `{0}`")]
    Anyhow(#[from] anyhow::Error),
}

impl ResponseError for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (&self).into_response()
    }
}

impl IntoResponse for &Error {
    fn into_response(self) -> axum::response::Response {
        use Error::*;
        match self {
            Client(e) => e.into_response(),
            Classification(_) => self.format_err(StatusCode::BAD_REQUEST),
            Backend(_) => self.format_err(StatusCode::SERVICE_UNAVAILABLE),
            Postgres(_) => self.format_err(StatusCode::SERVICE_UNAVAILABLE),
            Pool(_) => self.format_err(StatusCode::SERVICE_UNAVAILABLE),
            Amqp(_) => self.format_err(StatusCode::SERVICE_UNAVAILABLE),
            Mongo(_) => self.format_err(StatusCode::SERVICE_UNAVAILABLE),
            Json(_) => self.format_err(StatusCode::BAD_REQUEST),
            Internal(_) => self.format_err(StatusCode::INTERNAL_SERVER_ERROR),
            Anyhow(_) => self.format_err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

macro_rules! internal_from {
    ($to:ty => { $($from:ty,)* }) => {
        $(
            impl From<$from> for $to {
                fn from(v: $from) -> Self {
                    <$to>::Internal(v.to_string())
                }
            }
        )*
    };
}

internal_from! {
    Error => {
        std::num::ParseIntError,
        regex::Error,
    }
}
