pub mod password;
pub mod request_meta;
pub mod validation;

pub use password::{CredentialHasher, Password, PasswordHashString};
pub use request_meta::ClientMeta;
pub use validation::{ValidatedJson, ValidatedPath};
