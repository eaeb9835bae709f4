//! Folio - article publishing REST API
//!
//! Users, articles and JWT authentication behind an axum router, with every
//! mutation gated by a role based access control list (see [`acl`]).
//! It exposes all modules for testing purposes.

pub mod acl;
pub mod articles;
pub mod auth;
pub mod context;
pub mod entities;
pub mod errors;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod tokens;
pub mod users;
pub mod web;
