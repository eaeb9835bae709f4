use crate::acl::{Actor, Role};
use crate::context::RequestContext;
use crate::errors::FolioError;
use crate::tokens::{AuthTokens, TokenManager};
use crate::users::{CreateUserInput, UserOutput, UserService};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(length(min = 1, max = 200))]
    pub username: String,
    #[validate(length(min = 1, max = 200))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 6, max = 100))]
    pub username: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
    #[validate(email, length(max = 100))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenInput {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    tokens: TokenManager,
}

impl AuthService {
    pub fn new(users: UserService, tokens: TokenManager) -> Self {
        Self { users, tokens }
    }

    /// Resolve credentials to the actor that will be encoded into tokens.
    pub async fn validate_user(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<Actor, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "validate_user was called");

        let user = self
            .users
            .validate_username_password(ctx, username, password)
            .await?;

        if user.is_account_disabled {
            return Err(FolioError::Unauthorized(
                "This user account has been disabled".to_string(),
            ));
        }

        Ok(user.actor())
    }

    pub async fn login(
        &self,
        ctx: &RequestContext,
        input: LoginInput,
    ) -> Result<AuthTokens, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "login was called");
        input.validate()?;

        let actor = self
            .validate_user(ctx, &input.username, &input.password)
            .await?;
        self.tokens.issue(&actor)
    }

    pub async fn register(
        &self,
        ctx: &RequestContext,
        input: RegisterInput,
    ) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "register was called");
        input.validate()?;

        self.users
            .create_user(
                ctx,
                CreateUserInput {
                    name: input.name,
                    username: input.username,
                    password: input.password,
                    email: input.email,
                    roles: vec![Role::User],
                    is_account_disabled: false,
                },
            )
            .await
    }

    pub async fn refresh_token(
        &self,
        ctx: &RequestContext,
        input: RefreshTokenInput,
    ) -> Result<AuthTokens, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "refresh_token was called");
        input.validate()?;

        let user_id = self.tokens.verify_refresh(&input.refresh_token)?;
        let user = self
            .users
            .find_by_id(ctx, user_id)
            .await?
            .ok_or_else(|| FolioError::Unauthorized("Invalid user id".to_string()))?;

        if user.is_account_disabled {
            return Err(FolioError::Unauthorized(
                "This user account has been disabled".to_string(),
            ));
        }

        self.tokens.issue(&user.actor())
    }
}
