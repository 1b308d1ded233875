//! Static role-to-action permission table.
//!
//! Each action lists the roles it admits. There is no implied hierarchy: a
//! role holds an action only if it is enumerated on that action's row.

use uuid::Uuid;

use crate::models::{Role, User};
use crate::services::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ViewOwnProfile,
    CreateApplication,
    ViewAllApplications,
    ManageApplicationStatus,
    DeactivateUser,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::ViewOwnProfile,
        Action::CreateApplication,
        Action::ViewAllApplications,
        Action::ManageApplicationStatus,
        Action::DeactivateUser,
    ];

    pub fn allowed_roles(self) -> &'static [Role] {
        use Role::*;
        match self {
            Action::ViewOwnProfile | Action::CreateApplication => {
                &[SuperAdmin, Admin, Manager, Staff, Client]
            }
            Action::ViewAllApplications | Action::ManageApplicationStatus => {
                &[SuperAdmin, Admin, Manager, Staff]
            }
            Action::DeactivateUser => &[SuperAdmin, Admin],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewOwnProfile => "view_own_profile",
            Action::CreateApplication => "create_application",
            Action::ViewAllApplications => "view_all_applications",
            Action::ManageApplicationStatus => "manage_application_status",
            Action::DeactivateUser => "deactivate_user",
        }
    }
}

/// `role ∈ required`.
pub fn authorize(role: Role, required: &[Role]) -> bool {
    required.contains(&role)
}

pub fn is_permitted(user: &User, action: Action) -> bool {
    authorize(user.role, action.allowed_roles())
}

pub fn ensure_permitted(user: &User, action: Action) -> Result<(), ServiceError> {
    if is_permitted(user, action) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %user.user_id,
            role = %user.role,
            action = action.as_str(),
            "Action denied by role"
        );
        Err(ServiceError::Forbidden("role not permitted"))
    }
}

/// Guard for actions a user may never perform on their own account,
/// applied on top of the role check.
pub fn ensure_not_self(actor: &User, target_user_id: Uuid) -> Result<(), ServiceError> {
    if actor.user_id == target_user_id {
        tracing::warn!(user_id = %actor.user_id, "Self-targeted action refused");
        Err(ServiceError::Forbidden("action not allowed on own account"))
    } else {
        Ok(())
    }
}
