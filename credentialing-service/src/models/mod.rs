pub mod application;
pub mod audit_log;
pub mod session;
pub mod user;

pub use application::{Application, ApplicationStatus, IllegalTransition};
pub use audit_log::{AuditAction, AuditEntry, RequestMeta};
pub use session::{hash_token, DeviceInfo, NewSession, RefreshLookup, Session, SessionInfo};
pub use user::{normalize_email, AccountStatus, NewUser, Role, User, UserResponse};
