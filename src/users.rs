use crate::acl::{policies, Acl, Action, Actor, Role};
use crate::context::RequestContext;
use crate::errors::FolioError;
use crate::storage::{self, NewUser, User};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOutput {
    pub id: i32,
    pub name: String,
    pub username: String,
    pub roles: Vec<Role>,
    pub email: String,
    pub is_account_disabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<User> for UserOutput {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            roles: user.roles,
            email: user.email,
            is_account_disabled: user.is_account_disabled,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl UserOutput {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.username.clone(), self.roles.clone())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub is_account_disabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 6, max = 100))]
    pub password: Option<String>,
    #[validate(email, length(max = 100))]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    db: DatabaseConnection,
    acl: Arc<Acl<User>>,
}

impl UserService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            acl: Arc::new(policies::user_acl()),
        }
    }

    pub async fn create_user(
        &self,
        ctx: &RequestContext,
        input: CreateUserInput,
    ) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "create_user was called");

        if storage::find_user_by_username(&self.db, &input.username)
            .await?
            .is_some()
        {
            return Err(FolioError::Conflict(format!(
                "Username {} is already taken",
                input.username
            )));
        }

        let user = storage::create_user(
            &self.db,
            NewUser {
                name: input.name,
                username: input.username,
                password: input.password,
                email: input.email,
                roles: input.roles,
                is_account_disabled: input.is_account_disabled,
            },
        )
        .await?;

        Ok(user.into())
    }

    /// Check credentials. Unknown usernames and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn validate_username_password(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "validate_username_password was called");

        let user = storage::find_user_by_username(&self.db, username)
            .await?
            .ok_or_else(FolioError::unauthorized)?;

        if !storage::verify_password(&user.password_hash, password)? {
            return Err(FolioError::unauthorized());
        }

        Ok(user.into())
    }

    pub async fn find_by_id(
        &self,
        ctx: &RequestContext,
        id: i32,
    ) -> Result<Option<UserOutput>, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "find_by_id was called");
        Ok(storage::find_user_by_id(&self.db, id).await?.map(Into::into))
    }

    pub async fn get_user_by_id(
        &self,
        ctx: &RequestContext,
        id: i32,
    ) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "get_user_by_id was called");
        Ok(storage::get_user_by_id(&self.db, id).await?.into())
    }

    pub async fn find_by_username(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> Result<Option<UserOutput>, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "find_by_username was called");
        Ok(storage::find_user_by_username(&self.db, username)
            .await?
            .map(Into::into))
    }

    pub async fn get_my_profile(&self, ctx: &RequestContext) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "get_my_profile was called");

        let actor = ctx.actor()?;
        self.get_user_by_id(ctx, actor.id).await
    }

    pub async fn get_users(
        &self,
        ctx: &RequestContext,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<UserOutput>, u64), FolioError> {
        tracing::info!(request_id = %ctx.request_id, "get_users was called");

        let actor = ctx.actor()?;
        if !self.acl.for_actor(actor).can_do(Action::List, None) {
            return Err(FolioError::unauthorized());
        }

        let (users, count) = storage::list_users(&self.db, limit, offset).await?;
        Ok((users.into_iter().map(Into::into).collect(), count))
    }

    /// Read a single account on behalf of the authenticated actor.
    pub async fn get_user(&self, ctx: &RequestContext, id: i32) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "get_user was called");

        let actor = ctx.actor()?;
        let user = storage::get_user_by_id(&self.db, id).await?;
        if !self.acl.for_actor(actor).can_do(Action::Read, Some(&user)) {
            return Err(FolioError::unauthorized());
        }

        Ok(user.into())
    }

    pub async fn update_user(
        &self,
        ctx: &RequestContext,
        id: i32,
        input: UpdateUserInput,
    ) -> Result<UserOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "update_user was called");
        input.validate()?;

        let actor = ctx.actor()?;
        let mut user = storage::get_user_by_id(&self.db, id).await?;
        if !self.acl.for_actor(actor).can_do(Action::Update, Some(&user)) {
            return Err(FolioError::unauthorized());
        }

        if let Some(name) = input.name {
            user.name = name;
        }
        if let Some(password) = input.password {
            user.password_hash = storage::hash_password(&password)?;
        }
        if let Some(email) = input.email {
            user.email = email;
        }

        tracing::debug!(request_id = %ctx.request_id, user_id = id, "saving user");
        Ok(storage::save_user(&self.db, &user).await?.into())
    }
}
