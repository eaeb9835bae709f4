//! Role-based access control.
//!
//! Each resource domain builds one [`Acl`] at startup from a fixed list of
//! rules (see [`policies`]) and services consult it before touching storage.

pub mod engine;
pub mod policies;
pub mod types;

pub use engine::{Acl, AclBuilder, ActorAcl, Predicate, Rule};
pub use types::{Action, Actor, Role};
