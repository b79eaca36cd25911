use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::path::PathBuf;
use thiserror::Error;

/// 监督器可能返回的错误，全部可恢复
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Launch script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Failed to start server process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Server is not running")]
    NotRunning,

    #[error("Unsupported OS selector: '{0}'")]
    UnsupportedOs(String),
}

impl ResponseError for SupervisorError {
    fn status_code(&self) -> StatusCode {
        match self {
            SupervisorError::AlreadyRunning
            | SupervisorError::NotRunning
            | SupervisorError::UnsupportedOs(_) => StatusCode::BAD_REQUEST,
            SupervisorError::ScriptNotFound(_) => StatusCode::NOT_FOUND,
            SupervisorError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
