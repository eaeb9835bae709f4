use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use miette::Diagnostic;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FolioError {
    #[error("{0}")]
    #[diagnostic(code(folio::unauthorized))]
    Unauthorized(String),

    #[error("{0}")]
    #[diagnostic(code(folio::not_found))]
    NotFound(String),

    #[error("Validation failed")]
    #[diagnostic(code(folio::validation))]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    #[diagnostic(code(folio::bad_request))]
    BadRequest(String),

    #[error("{0}")]
    #[diagnostic(code(folio::conflict))]
    Conflict(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(folio::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    #[diagnostic(code(folio::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(folio::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(folio::serde))]
    Serde(#[from] serde_json::Error),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(folio::jose))]
    Jose(String),

    #[error("{0}")]
    #[diagnostic(code(folio::other))]
    Other(String),
}

impl From<josekit::JoseError> for FolioError {
    fn from(value: josekit::JoseError) -> Self {
        FolioError::Jose(value.to_string())
    }
}

impl FolioError {
    pub fn unauthorized() -> Self {
        FolioError::Unauthorized("Unauthorized".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FolioError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            FolioError::NotFound(_) => StatusCode::NOT_FOUND,
            FolioError::Validation(_) | FolioError::BadRequest(_) => StatusCode::BAD_REQUEST,
            FolioError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_name(&self) -> &'static str {
        match self {
            FolioError::Unauthorized(_) => "UnauthorizedException",
            FolioError::NotFound(_) => "NotFoundException",
            FolioError::Validation(_) | FolioError::BadRequest(_) => "BadRequestException",
            FolioError::Conflict(_) => "ConflictException",
            _ => "InternalException",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            FolioError::Validation(errors) => serde_json::to_value(errors.field_errors()).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for FolioError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error while handling request");
            "Internal server error".to_string()
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
            self.to_string()
        };

        let mut error = json!({
            "statusCode": status.as_u16(),
            "errorName": self.error_name(),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let Some(details) = self.details() {
            error["details"] = details;
        }

        let mut response = (status, Json(json!({ "error": error.clone() }))).into_response();
        response.extensions_mut().insert(ErrorBody(error));
        response
    }
}

/// The `error` object of an error response, kept on the response so request
/// middleware can add per-request fields (`path`, `requestId`).
#[derive(Debug, Clone)]
pub struct ErrorBody(pub Value);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_response() {
        let resp = FolioError::unauthorized().into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["statusCode"], 401);
        assert_eq!(body["error"]["errorName"], "UnauthorizedException");
        assert_eq!(body["error"]["message"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_error_body_attached_to_response() {
        let resp = FolioError::NotFound("Article 3 not found".into()).into_response();
        let ErrorBody(error) = resp
            .extensions()
            .get::<ErrorBody>()
            .cloned()
            .expect("error body extension");
        assert_eq!(error["message"], "Article 3 not found");
        assert_eq!(body_json(resp).await["error"], error);
    }

    #[tokio::test]
    async fn test_internal_message_is_suppressed() {
        let resp = FolioError::Other("connection string leaked".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FolioError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FolioError::Conflict("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            FolioError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
