use crate::acl::{Acl, Action, Actor, Role};
use crate::storage::{Article, User};

/// Admins manage every article; users create, list and read any article and
/// change only their own.
pub fn article_acl() -> Acl<Article> {
    Acl::builder()
        .allow(Role::Admin, &[Action::Manage])
        .allow(Role::User, &[Action::Create, Action::List, Action::Read])
        .allow_if(Role::User, &[Action::Update, Action::Delete], is_article_author)
        .build()
}

/// Admins manage every account; users read any account and update their own.
pub fn user_acl() -> Acl<User> {
    Acl::builder()
        .allow(Role::Admin, &[Action::Manage])
        .allow(Role::User, &[Action::Read])
        .allow_if(Role::User, &[Action::Update], is_user_itself)
        .build()
}

pub fn is_article_author(article: Option<&Article>, actor: &Actor) -> bool {
    article.is_some_and(|a| a.author_id == actor.id)
}

pub fn is_user_itself(user: Option<&User>, actor: &Actor) -> bool {
    user.is_some_and(|u| u.id == actor.id)
}
