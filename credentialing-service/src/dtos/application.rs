use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::ApplicationStatus;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    #[validate(length(min = 1, max = 100, message = "Service type is required"))]
    #[schema(example = "hospital_privileging")]
    pub service_type: String,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    #[schema(example = "submitted")]
    pub target_status: ApplicationStatus,
}
