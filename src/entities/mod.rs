pub mod article;
pub mod user;

pub use article::Entity as Article;
pub use user::Entity as User;
