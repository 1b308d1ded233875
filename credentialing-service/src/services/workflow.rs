//! Application status machine: validates a requested transition against the
//! transition table, authorizes the actor, then persists the change together
//! with its audit entry.

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{
        Application, ApplicationStatus, AuditAction, AuditEntry, IllegalTransition, RequestMeta,
        User,
    },
    services::{
        error::ServiceError,
        rbac::{self, Action},
        Clock,
    },
    store::{ApplicationStore, AuditSink},
};

impl From<IllegalTransition> for ServiceError {
    fn from(err: IllegalTransition) -> Self {
        ServiceError::IllegalTransition {
            from: err.from,
            to: err.to,
        }
    }
}

#[derive(Clone)]
pub struct ApplicationWorkflow {
    applications: Arc<dyn ApplicationStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl ApplicationWorkflow {
    pub fn new(
        applications: Arc<dyn ApplicationStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            applications,
            audit,
            clock,
        }
    }

    pub async fn create_draft(
        &self,
        actor: &User,
        service_type: String,
        notes: Option<String>,
        meta: &RequestMeta,
    ) -> Result<Application, ServiceError> {
        rbac::ensure_permitted(actor, Action::CreateApplication)?;

        let now = self.clock.now();
        let application = Application::draft(actor.user_id, service_type, notes, now);
        self.applications.insert(&application).await?;

        tracing::info!(
            application_id = %application.id,
            owner_id = %actor.user_id,
            "Application created"
        );

        let entry = AuditEntry::new(
            Some(actor.user_id),
            AuditAction::ApplicationCreated,
            Some(application.id),
            meta,
            now,
        )
        .with_snapshots(None, Some(status_snapshot(application.status)));
        self.audit.append(&entry).await?;

        Ok(application)
    }

    /// The owner, or any role allowed to view all applications.
    pub async fn get(&self, actor: &User, application_id: Uuid) -> Result<Application, ServiceError> {
        let application = self.load(application_id).await?;

        if application.owner_id != actor.user_id
            && !rbac::is_permitted(actor, Action::ViewAllApplications)
        {
            tracing::warn!(
                user_id = %actor.user_id,
                application_id = %application_id,
                "Application read denied"
            );
            return Err(ServiceError::Forbidden("not the owner"));
        }

        Ok(application)
    }

    /// Checks run in order: existence, legality of the edge, authorization.
    /// The write is conditional on the status read here; losing a race to a
    /// concurrent transition yields `ConcurrentUpdate`.
    pub async fn transition(
        &self,
        actor: &User,
        application_id: Uuid,
        target: ApplicationStatus,
        meta: &RequestMeta,
    ) -> Result<Application, ServiceError> {
        let application = self.load(application_id).await?;
        let from = application.status;

        if let Err(illegal) = from.validate_transition(target) {
            tracing::info!(
                application_id = %application_id,
                from = %from,
                to = %target,
                "Illegal status transition requested"
            );
            return Err(illegal.into());
        }

        authorize_transition(actor, &application, target)?;

        let now = self.clock.now();
        let audit = AuditEntry::new(
            Some(actor.user_id),
            AuditAction::ApplicationStatusChanged,
            Some(application_id),
            meta,
            now,
        )
        .with_snapshots(Some(status_snapshot(from)), Some(status_snapshot(target)));

        let updated = self
            .applications
            .update_status(application_id, from, target, now, &audit)
            .await?
            .ok_or_else(|| {
                tracing::warn!(
                    application_id = %application_id,
                    expected = %from,
                    "Status changed underneath transition"
                );
                ServiceError::ConcurrentUpdate
            })?;

        tracing::info!(
            application_id = %application_id,
            actor_id = %actor.user_id,
            from = %from,
            to = %target,
            "Application status changed"
        );

        Ok(updated)
    }

    async fn load(&self, application_id: Uuid) -> Result<Application, ServiceError> {
        self.applications
            .find_by_id(application_id)
            .await?
            .ok_or(ServiceError::NotFound("Application"))
    }
}

/// Case managers may drive any legal edge. The owner may only withdraw an
/// application that has not entered review.
fn authorize_transition(
    actor: &User,
    application: &Application,
    target: ApplicationStatus,
) -> Result<(), ServiceError> {
    if rbac::is_permitted(actor, Action::ManageApplicationStatus) {
        return Ok(());
    }

    let owner_withdrawal = application.owner_id == actor.user_id
        && target == ApplicationStatus::Cancelled
        && matches!(
            application.status,
            ApplicationStatus::Draft | ApplicationStatus::Submitted
        );

    if owner_withdrawal {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %actor.user_id,
            role = %actor.role,
            application_id = %application.id,
            to = %target,
            "Status transition denied"
        );
        Err(ServiceError::Forbidden("transition not permitted for this user"))
    }
}

fn status_snapshot(status: ApplicationStatus) -> serde_json::Value {
    serde_json::json!({ "status": status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Role};
    use chrono::Utc;

    fn user_with(role: Role) -> User {
        User::new(
            NewUser {
                email: format!("{}@clinic.org", role),
                password_hash: "$argon2id$stub".to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                phone: None,
                role,
            },
            Utc::now(),
        )
    }

    fn application_in(owner: &User, status: ApplicationStatus) -> Application {
        let mut app = Application::draft(owner.user_id, "licensing".to_string(), None, Utc::now());
        app.status = status;
        app
    }

    #[test]
    fn staff_may_drive_any_edge() {
        let owner = user_with(Role::Client);
        let staff = user_with(Role::Staff);
        let app = application_in(&owner, ApplicationStatus::InReview);
        assert!(authorize_transition(&staff, &app, ApplicationStatus::Approved).is_ok());
    }

    #[test]
    fn owner_may_cancel_only_before_review() {
        let owner = user_with(Role::Client);
        for status in [ApplicationStatus::Draft, ApplicationStatus::Submitted] {
            let app = application_in(&owner, status);
            assert!(authorize_transition(&owner, &app, ApplicationStatus::Cancelled).is_ok());
        }

        let pending = application_in(&owner, ApplicationStatus::PendingDocuments);
        assert!(authorize_transition(&owner, &pending, ApplicationStatus::Cancelled).is_err());

        let draft = application_in(&owner, ApplicationStatus::Draft);
        assert!(authorize_transition(&owner, &draft, ApplicationStatus::Submitted).is_err());
    }

    #[test]
    fn other_clients_may_not_cancel() {
        let owner = user_with(Role::Client);
        let stranger = user_with(Role::Client);
        let app = application_in(&owner, ApplicationStatus::Draft);
        assert!(matches!(
            authorize_transition(&stranger, &app, ApplicationStatus::Cancelled),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
