pub mod application;
pub mod auth;

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// Strip surrounding whitespace so field validators see the value the
/// service will store.
pub(crate) fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// Error body rendered by `AppError` and the request extractors.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Invalid email or password")]
    pub error: String,
    #[schema(example = "INVALID_CREDENTIALS")]
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Padded {
        #[serde(deserialize_with = "trimmed")]
        value: String,
    }

    #[test]
    fn trimmed_strips_surrounding_whitespace_only() {
        let parsed: Padded = serde_json::from_str(r#"{"value":"  Dr. Lee@Clinic.org \t"}"#).unwrap();
        assert_eq!(parsed.value, "Dr. Lee@Clinic.org");
    }

    #[test]
    fn trimmed_rejects_non_strings() {
        assert!(serde_json::from_str::<Padded>(r#"{"value":42}"#).is_err());
    }
}
