use crate::acl::Actor;
use crate::errors::{ErrorBody, FolioError};
use crate::tokens::TokenManager;
use axum::body::Body;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use std::convert::Infallible;
use std::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Per-request metadata handed to every service call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub url: String,
    pub ip: Option<String>,
    pub user: Option<Actor>,
}

impl RequestContext {
    /// Context for work that does not originate from an HTTP request.
    pub fn internal() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            request_id: header_str(&parts.headers, REQUEST_ID_HEADER)
                .unwrap_or_default()
                .to_string(),
            url: parts.uri.to_string(),
            ip: header_str(&parts.headers, FORWARDED_FOR_HEADER)
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string()),
            user: None,
        }
    }

    pub fn with_user(mut self, actor: Actor) -> Self {
        self.user = Some(actor);
        self
    }

    /// The authenticated actor, or `Unauthorized` for anonymous requests.
    pub fn actor(&self) -> Result<&Actor, FolioError> {
        self.user.as_ref().ok_or_else(FolioError::unauthorized)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Assigns a request id (unless the client sent one), echoes it on the
/// response, stamps `path` and `requestId` into error bodies and logs one
/// line per completed request.
pub async fn request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = match header_str(request.headers(), REQUEST_ID_HEADER) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = uuid::Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            id
        }
    };
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let url = request.uri().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    if let Some(ErrorBody(mut error)) = response.extensions_mut().remove::<ErrorBody>() {
        error["path"] = json!(url);
        error["requestId"] = json!(request_id);
        match serde_json::to_vec(&json!({ "error": error })) {
            Ok(body) => {
                response.headers_mut().remove(header::CONTENT_LENGTH);
                *response.body_mut() = Body::from(body);
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode error body"),
        }
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    tracing::info!(
        request_id = %request_id,
        %method,
        path = %path,
        status = response.status().as_u16(),
        response_time_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Request context for endpoints that do not require authentication.
pub struct ReqContext(pub RequestContext);

impl<S> FromRequestParts<S> for ReqContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ReqContext(RequestContext::from_parts(parts)))
    }
}

/// Request context carrying the actor from a valid bearer access token.
pub struct Authenticated(pub RequestContext);

impl<S> FromRequestParts<S> for Authenticated
where
    TokenManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = FolioError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = header_str(&parts.headers, axum::http::header::AUTHORIZATION.as_str())
            .and_then(|s| s.strip_prefix("Bearer "))
            .ok_or_else(FolioError::unauthorized)?;

        let tokens = TokenManager::from_ref(state);
        let actor = tokens.verify_access(token.trim())?;

        Ok(Authenticated(RequestContext::from_parts(parts).with_user(actor)))
    }
}
