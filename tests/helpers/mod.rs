#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{ctx_for, ArticleBuilder, UserBuilder};
pub use db::TestDb;
