use crate::data::ClientError;
use crate::import::ImportError;
use crate::types::Toast;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

/// Handler failures. Every variant reaches the operator as an error toast.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{summary}: {source}")]
    Service {
        summary: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{summary}")]
    Invalid {
        summary: &'static str,
        errors: serde_json::Value,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn service(summary: &'static str) -> impl FnOnce(ClientError) -> Self {
        move |source| AppError::Service { summary, source }
    }

    pub fn invalid(summary: &'static str, errors: impl Serialize) -> Self {
        AppError::Invalid {
            summary,
            errors: serde_json::to_value(errors).unwrap_or_default(),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Client(source) => AppError::Service {
                summary: "Import konnte nicht gespeichert werden.",
                source,
            },
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    toast: Toast,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        warn!("{}", self);
        let (status, body) = match self {
            AppError::Service { summary, source } => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    toast: Toast::error(summary, source.detail()),
                    errors: None,
                },
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    toast: Toast::error("Seite nicht gefunden", what),
                    errors: None,
                },
            ),
            AppError::Invalid { summary, errors } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    toast: Toast::error(summary, String::new()),
                    errors: Some(errors),
                },
            ),
            AppError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    toast: Toast::error("Ungültige Anfrage", detail),
                    errors: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Catch-all for unknown routes.
pub async fn not_found(uri: axum::http::Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
