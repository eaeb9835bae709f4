use crate::acl::{policies, Acl, Action};
use crate::context::RequestContext;
use crate::errors::FolioError;
use crate::storage::{self, Article, NewArticle};
use crate::users::UserService;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateArticleInput {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub post: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateArticleInput {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub post: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleOutput {
    pub id: i32,
    pub title: String,
    pub post: String,
    pub author_id: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Article> for ArticleOutput {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            title: article.title,
            post: article.post,
            author_id: article.author_id,
            created_at: article.created_at,
            updated_at: article.updated_at,
        }
    }
}

/// Article CRUD guarded by [`policies::article_acl`].
#[derive(Clone)]
pub struct ArticleService {
    db: DatabaseConnection,
    users: UserService,
    acl: Arc<Acl<Article>>,
}

impl ArticleService {
    pub fn new(db: DatabaseConnection, users: UserService) -> Self {
        Self {
            db,
            users,
            acl: Arc::new(policies::article_acl()),
        }
    }

    pub async fn create_article(
        &self,
        ctx: &RequestContext,
        input: CreateArticleInput,
    ) -> Result<ArticleOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "create_article was called");
        input.validate()?;

        let actor = ctx.actor()?;
        if !self.acl.for_actor(actor).can_do(Action::Create, None) {
            return Err(FolioError::unauthorized());
        }

        // The token may outlive its account.
        let author = self.users.get_user_by_id(ctx, actor.id).await?;

        let article = storage::create_article(
            &self.db,
            author.id,
            NewArticle {
                title: input.title,
                post: input.post,
            },
        )
        .await?;

        Ok(article.into())
    }

    pub async fn get_articles(
        &self,
        ctx: &RequestContext,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<ArticleOutput>, u64), FolioError> {
        tracing::info!(request_id = %ctx.request_id, "get_articles was called");

        let actor = ctx.actor()?;
        if !self.acl.for_actor(actor).can_do(Action::List, None) {
            return Err(FolioError::unauthorized());
        }

        let (articles, count) = storage::list_articles(&self.db, limit, offset).await?;
        Ok((articles.into_iter().map(Into::into).collect(), count))
    }

    pub async fn get_article_by_id(
        &self,
        ctx: &RequestContext,
        id: i32,
    ) -> Result<ArticleOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "get_article_by_id was called");

        let actor = ctx.actor()?;
        let article = storage::get_article_by_id(&self.db, id).await?;
        if !self.acl.for_actor(actor).can_do(Action::Read, Some(&article)) {
            return Err(FolioError::unauthorized());
        }

        Ok(article.into())
    }

    pub async fn update_article(
        &self,
        ctx: &RequestContext,
        id: i32,
        input: UpdateArticleInput,
    ) -> Result<ArticleOutput, FolioError> {
        tracing::info!(request_id = %ctx.request_id, "update_article was called");
        input.validate()?;

        let actor = ctx.actor()?;
        let mut article = storage::get_article_by_id(&self.db, id).await?;
        if !self.acl.for_actor(actor).can_do(Action::Update, Some(&article)) {
            return Err(FolioError::unauthorized());
        }

        if let Some(title) = input.title {
            article.title = title;
        }
        if let Some(post) = input.post {
            article.post = post;
        }

        Ok(storage::save_article(&self.db, &article).await?.into())
    }

    pub async fn delete_article(&self, ctx: &RequestContext, id: i32) -> Result<(), FolioError> {
        tracing::info!(request_id = %ctx.request_id, "delete_article was called");

        let actor = ctx.actor()?;
        let article = storage::get_article_by_id(&self.db, id).await?;
        if !self.acl.for_actor(actor).can_do(Action::Delete, Some(&article)) {
            return Err(FolioError::unauthorized());
        }

        storage::remove_article(&self.db, article.id).await
    }
}
