use crate::acl::Role;
use crate::entities;
use crate::errors::FolioError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use migration::MigratorTrait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub email: String,
    pub is_account_disabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub is_account_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i32,
    pub title: String,
    pub post: String,
    pub author_id: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub post: String,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, FolioError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// Apply all pending schema migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), FolioError> {
    migration::Migrator::up(db, None).await?;
    Ok(())
}

// Password hashing

pub fn hash_password(password: &str) -> Result<String, FolioError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| FolioError::Other(format!("Password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password_hash: &str, password: &str) -> Result<bool, FolioError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| FolioError::Other(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// User repository

fn user_from_model(model: entities::user::Model) -> Result<User, FolioError> {
    let roles: Vec<Role> = serde_json::from_str(&model.roles)?;
    Ok(User {
        id: model.id,
        name: model.name,
        username: model.username,
        password_hash: model.password,
        roles,
        email: model.email,
        is_account_disabled: model.is_account_disabled,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn conflict_or_db(err: sea_orm::DbErr, what: &str) -> FolioError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            FolioError::Conflict(format!("{what} already exists"))
        }
        _ => FolioError::Db(err),
    }
}

pub async fn create_user(db: &DatabaseConnection, input: NewUser) -> Result<User, FolioError> {
    let password_hash = hash_password(&input.password)?;
    let now = Utc::now().timestamp();

    let user = entities::user::ActiveModel {
        name: Set(input.name),
        username: Set(input.username),
        password: Set(password_hash),
        roles: Set(serde_json::to_string(&input.roles)?),
        email: Set(input.email),
        is_account_disabled: Set(input.is_account_disabled),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let model = user
        .insert(db)
        .await
        .map_err(|e| conflict_or_db(e, "User"))?;
    user_from_model(model)
}

pub async fn find_user_by_id(db: &DatabaseConnection, id: i32) -> Result<Option<User>, FolioError> {
    entities::User::find_by_id(id)
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

/// Like [`find_user_by_id`], but a missing user is an error.
pub async fn get_user_by_id(db: &DatabaseConnection, id: i32) -> Result<User, FolioError> {
    find_user_by_id(db, id)
        .await?
        .ok_or_else(|| FolioError::NotFound(format!("User {} not found", id)))
}

pub async fn find_user_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<User>, FolioError> {
    use entities::user::{Column, Entity};

    Entity::find()
        .filter(Column::Username.eq(username))
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

pub async fn list_users(
    db: &DatabaseConnection,
    limit: u64,
    offset: u64,
) -> Result<(Vec<User>, u64), FolioError> {
    use entities::user::{Column, Entity};

    let models = Entity::find()
        .order_by_asc(Column::Id)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;
    let count = Entity::find().count(db).await?;

    let users = models
        .into_iter()
        .map(user_from_model)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((users, count))
}

/// Persist every mutable field of `user` and bump `updated_at`.
pub async fn save_user(db: &DatabaseConnection, user: &User) -> Result<User, FolioError> {
    let active = entities::user::ActiveModel {
        id: Set(user.id),
        name: Set(user.name.clone()),
        username: Set(user.username.clone()),
        password: Set(user.password_hash.clone()),
        roles: Set(serde_json::to_string(&user.roles)?),
        email: Set(user.email.clone()),
        is_account_disabled: Set(user.is_account_disabled),
        created_at: Set(user.created_at),
        updated_at: Set(Utc::now().timestamp()),
    };

    let model = active
        .update(db)
        .await
        .map_err(|e| match e {
            sea_orm::DbErr::RecordNotUpdated => {
                FolioError::NotFound(format!("User {} not found", user.id))
            }
            other => conflict_or_db(other, "User"),
        })?;
    user_from_model(model)
}

// Article repository

impl From<entities::article::Model> for Article {
    fn from(model: entities::article::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            post: model.post,
            author_id: model.author_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub async fn create_article(
    db: &DatabaseConnection,
    author_id: i32,
    input: NewArticle,
) -> Result<Article, FolioError> {
    let now = Utc::now().timestamp();

    let article = entities::article::ActiveModel {
        title: Set(input.title),
        post: Set(input.post),
        author_id: Set(author_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    Ok(article.insert(db).await?.into())
}

pub async fn get_article_by_id(db: &DatabaseConnection, id: i32) -> Result<Article, FolioError> {
    entities::Article::find_by_id(id)
        .one(db)
        .await?
        .map(Article::from)
        .ok_or_else(|| FolioError::NotFound(format!("Article {} not found", id)))
}

pub async fn list_articles(
    db: &DatabaseConnection,
    limit: u64,
    offset: u64,
) -> Result<(Vec<Article>, u64), FolioError> {
    use entities::article::{Column, Entity};

    let models = Entity::find()
        .order_by_asc(Column::Id)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;
    let count = Entity::find().count(db).await?;

    Ok((models.into_iter().map(Article::from).collect(), count))
}

pub async fn save_article(db: &DatabaseConnection, article: &Article) -> Result<Article, FolioError> {
    let active = entities::article::ActiveModel {
        id: Set(article.id),
        title: Set(article.title.clone()),
        post: Set(article.post.clone()),
        author_id: Set(article.author_id),
        created_at: Set(article.created_at),
        updated_at: Set(Utc::now().timestamp()),
    };

    let model = active.update(db).await.map_err(|e| match e {
        sea_orm::DbErr::RecordNotUpdated => {
            FolioError::NotFound(format!("Article {} not found", article.id))
        }
        other => FolioError::Db(other),
    })?;
    Ok(model.into())
}

pub async fn remove_article(db: &DatabaseConnection, id: i32) -> Result<(), FolioError> {
    let result = entities::Article::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(FolioError::NotFound(format!("Article {} not found", id)));
    }
    Ok(())
}
