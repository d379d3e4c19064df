use thiserror::Error;
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The fallback resolver failed internally. Never cached.
    #[error("Client resolver failed: {0}")]
    Resolver(#[source] anyhow::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Wrap any error raised inside a resolver
    pub fn resolver<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        AppError::Resolver(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Resolver(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) | AppError::Runtime(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Resolver errors may carry backend details, keep them out of the body
        let body = match &self {
            AppError::Resolver(_) => "Client lookup unavailable".to_string(),
            AppError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Config(report.to_string())
    }
}
