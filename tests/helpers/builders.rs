use folio::acl::{Actor, Role};
use folio::context::RequestContext;
use folio::storage::{self, Article, NewArticle, NewUser, User};
use sea_orm::DatabaseConnection;

/// Builder for creating test users
pub struct UserBuilder {
    username: String,
    name: String,
    password: String,
    email: Option<String>,
    roles: Vec<Role>,
    disabled: bool,
}

impl UserBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            name: format!("{} name", username),
            password: "password123".to_string(),
            email: None,
            roles: vec![Role::User],
            disabled: false,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn admin(mut self) -> Self {
        self.roles = vec![Role::Admin];
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> User {
        let email = self
            .email
            .unwrap_or_else(|| format!("{}@example.com", self.username));

        storage::create_user(
            db,
            NewUser {
                name: self.name,
                username: self.username,
                password: self.password,
                email,
                roles: self.roles,
                is_account_disabled: self.disabled,
            },
        )
        .await
        .expect("Failed to create test user")
    }
}

/// Builder for creating test articles
pub struct ArticleBuilder {
    author_id: i32,
    title: String,
    post: String,
}

impl ArticleBuilder {
    pub fn new(author: &User) -> Self {
        Self {
            author_id: author.id,
            title: "Test".to_string(),
            post: "Hello, world!".to_string(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> Article {
        storage::create_article(
            db,
            self.author_id,
            NewArticle {
                title: self.title,
                post: self.post,
            },
        )
        .await
        .expect("Failed to create test article")
    }
}

/// Request context authenticated as `user`.
pub fn ctx_for(user: &User) -> RequestContext {
    RequestContext::internal().with_user(Actor::new(
        user.id,
        user.username.clone(),
        user.roles.clone(),
    ))
}
