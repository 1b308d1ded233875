//! Business services for the credentialing core.

pub mod auth;
mod clock;
pub mod error;
pub mod jwt;
pub mod rbac;
pub mod user;
pub mod workflow;

pub use auth::{AuthService, Principal};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthFailure, ServiceError};
pub use jwt::{Claims, IssuedToken, TokenError, TokenService, TokenType};
pub use user::UserService;
pub use workflow::ApplicationWorkflow;
