//! HTTP surface: routing, response envelopes and the security headers layer.
//!
//! Handlers stay thin. They extract the request context, validate input and
//! hand over to the services, which own authorization.
use crate::articles::{ArticleService, CreateArticleInput, UpdateArticleInput};
use crate::auth::{AuthService, LoginInput, RefreshTokenInput, RegisterInput};
use crate::context::{self, Authenticated, ReqContext};
use crate::errors::FolioError;
use crate::settings::Settings;
use crate::tokens::TokenManager;
use crate::users::{UpdateUserInput, UserService};
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRef, FromRequest, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub tokens: TokenManager,
    pub users: UserService,
    pub auth: AuthService,
    pub articles: ArticleService,
}

impl AppState {
    pub fn new(settings: Settings, db: DatabaseConnection, tokens: TokenManager) -> Self {
        let users = UserService::new(db.clone());
        let auth = AuthService::new(users.clone(), tokens.clone());
        let articles = ArticleService::new(db, users.clone());
        Self {
            settings: Arc::new(settings),
            tokens,
            users,
            auth,
            articles,
        }
    }
}

impl FromRef<AppState> for TokenManager {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub meta: Value,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: json!({}),
        }
    }

    pub fn with_count(data: T, count: u64) -> Self {
        Self {
            data,
            meta: json!({ "count": count }),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    100
}

/// `Json` whose rejections answer with the error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = FolioError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| FolioError::BadRequest(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// `Path` whose rejections answer with the error envelope.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = FolioError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| FolioError::BadRequest(e.body_text()))?;
        Ok(ApiPath(value))
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    // JSON only, nothing to load
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/auth/login", axum::routing::post(login))
        .route("/auth/register", axum::routing::post(register))
        .route("/auth/refresh-token", axum::routing::post(refresh_token))
        .route("/users/me", get(my_profile))
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user).patch(update_user))
        .route("/articles", get(list_articles).post(create_article))
        .route(
            "/articles/{id}",
            get(get_article).patch(update_article).delete(delete_article),
        )
        .fallback(not_found)
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(context::request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr: SocketAddr = state
        .settings
        .bind_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let app = router(state);

    tracing::info!(%addr, "Public API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

async fn hello() -> &'static str {
    "Hello World!"
}

async fn not_found(uri: axum::http::Uri) -> FolioError {
    FolioError::NotFound(format!("Cannot {}", uri.path()))
}

async fn jwks_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tokens.jwks_json())
}

fn pagination(
    query: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<PaginationParams, FolioError> {
    let Query(params) = query.map_err(|e| FolioError::BadRequest(e.body_text()))?;
    params.validate()?;
    Ok(params)
}

// Auth

async fn login(
    State(state): State<AppState>,
    ReqContext(ctx): ReqContext,
    ApiJson(input): ApiJson<LoginInput>,
) -> Result<impl IntoResponse, FolioError> {
    let tokens = state.auth.login(&ctx, input).await?;
    Ok(ApiResponse::new(tokens))
}

async fn register(
    State(state): State<AppState>,
    ReqContext(ctx): ReqContext,
    ApiJson(input): ApiJson<RegisterInput>,
) -> Result<impl IntoResponse, FolioError> {
    let user = state.auth.register(&ctx, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(user)))
}

async fn refresh_token(
    State(state): State<AppState>,
    ReqContext(ctx): ReqContext,
    ApiJson(input): ApiJson<RefreshTokenInput>,
) -> Result<impl IntoResponse, FolioError> {
    let tokens = state.auth.refresh_token(&ctx, input).await?;
    Ok(ApiResponse::new(tokens))
}

// Users

async fn my_profile(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<impl IntoResponse, FolioError> {
    let user = state.users.get_my_profile(&ctx).await?;
    Ok(ApiResponse::new(user))
}

async fn list_users(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    query: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<impl IntoResponse, FolioError> {
    let page = pagination(query)?;
    let (users, count) = state.users.get_users(&ctx, page.limit, page.offset).await?;
    Ok(ApiResponse::with_count(users, count))
}

async fn get_user(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(id): ApiPath<i32>,
) -> Result<impl IntoResponse, FolioError> {
    let user = state.users.get_user(&ctx, id).await?;
    Ok(ApiResponse::new(user))
}

async fn update_user(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<UpdateUserInput>,
) -> Result<impl IntoResponse, FolioError> {
    let user = state.users.update_user(&ctx, id, input).await?;
    Ok(ApiResponse::new(user))
}

// Articles

async fn create_article(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiJson(input): ApiJson<CreateArticleInput>,
) -> Result<impl IntoResponse, FolioError> {
    let article = state.articles.create_article(&ctx, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(article)))
}

async fn list_articles(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    query: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<impl IntoResponse, FolioError> {
    let page = pagination(query)?;
    let (articles, count) = state
        .articles
        .get_articles(&ctx, page.limit, page.offset)
        .await?;
    Ok(ApiResponse::with_count(articles, count))
}

async fn get_article(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(id): ApiPath<i32>,
) -> Result<impl IntoResponse, FolioError> {
    let article = state.articles.get_article_by_id(&ctx, id).await?;
    Ok(ApiResponse::new(article))
}

async fn update_article(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<UpdateArticleInput>,
) -> Result<impl IntoResponse, FolioError> {
    let article = state.articles.update_article(&ctx, id, input).await?;
    Ok(ApiResponse::new(article))
}

async fn delete_article(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(id): ApiPath<i32>,
) -> Result<impl IntoResponse, FolioError> {
    state.articles.delete_article(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
