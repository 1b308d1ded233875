//! Credentialing application model and its status transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    InReview,
    PendingDocuments,
    PendingPayment,
    Processing,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

use ApplicationStatus::*;

/// An edge missing from the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal status transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 10] = [
        Draft,
        Submitted,
        InReview,
        PendingDocuments,
        PendingPayment,
        Processing,
        Approved,
        Rejected,
        Completed,
        Cancelled,
    ];

    /// Outbound edges. Anything not listed here is illegal, including
    /// a transition to the current status.
    pub fn allowed_targets(self) -> &'static [ApplicationStatus] {
        match self {
            Draft => &[Submitted, Cancelled],
            Submitted => &[InReview, PendingDocuments, Cancelled],
            InReview => &[PendingDocuments, PendingPayment, Processing, Approved, Rejected],
            PendingDocuments => &[InReview, Cancelled],
            PendingPayment => &[Processing, Cancelled],
            Processing => &[Approved, Rejected, PendingDocuments],
            Approved => &[Completed],
            Rejected => &[InReview],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: ApplicationStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn validate_transition(self, target: ApplicationStatus) -> Result<(), IllegalTransition> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(IllegalTransition {
                from: self,
                to: target,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Draft => "draft",
            Submitted => "submitted",
            InReview => "in_review",
            PendingDocuments => "pending_documents",
            PendingPayment => "pending_payment",
            Processing => "processing",
            Approved => "approved",
            Rejected => "rejected",
            Completed => "completed",
            Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("Invalid application status: {}", s))
    }
}

/// Application entity (the subset the workflow needs).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[schema(example = "hospital_privileging")]
    pub service_type: String,
    pub notes: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Application {
    /// New applications always start in `draft`.
    pub fn draft(owner_id: Uuid, service_type: String, notes: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            service_type,
            notes,
            status: Draft,
            created_at: now,
            updated_at: now,
            status_changed_at: now,
        }
    }
}
