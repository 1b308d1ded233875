//! HTTP handlers for the credentialing service.

pub mod application;
pub mod auth;
pub mod user;

pub use application::*;
pub use auth::*;
pub use user::*;
