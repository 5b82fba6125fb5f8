//! Campaign types for bulk invites.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{CampaignId, InstitutionId, InviteId, RecipientId, Role, UserId};

/// Campaign record (a bulk batch of invites sent together)
#[derive(Clone, Debug)]
pub struct Campaign {
    pub id: CampaignId,
    pub institution_id: Option<InstitutionId>,
    pub name: String,
    pub role: Role,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a campaign
#[derive(Clone, Debug)]
pub struct CreateCampaignParams {
    pub institution_id: Option<InstitutionId>,
    pub name: String,
    pub role: Role,
    pub created_by: UserId,
}

/// Per-recipient delivery/engagement state.
///
/// Unlike single invites this is a stored column, because campaigns
/// need to count and filter by status across thousands of rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecipientStatus {
    Queued,
    Sent,
    Opened,
    Accepted,
    Failed,
}

/// Error type for parsing RecipientStatus from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRecipientStatusError(pub String);

impl std::fmt::Display for ParseRecipientStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid recipient status: {}", self.0)
    }
}

impl std::error::Error for ParseRecipientStatusError {}

impl FromStr for RecipientStatus {
    type Err = ParseRecipientStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RecipientStatus::Queued),
            "sent" => Ok(RecipientStatus::Sent),
            "opened" => Ok(RecipientStatus::Opened),
            "accepted" => Ok(RecipientStatus::Accepted),
            "failed" => Ok(RecipientStatus::Failed),
            _ => Err(ParseRecipientStatusError(s.to_string())),
        }
    }
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Queued => "queued",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Opened => "opened",
            RecipientStatus::Accepted => "accepted",
            RecipientStatus::Failed => "failed",
        }
    }

    /// Transition guard: status moves forward only, queued→sent→opened→
    /// accepted, with failed reachable from queued or sent (delivery
    /// failures). Opened and accepted presuppose successful delivery
    /// and never transition to failed.
    pub fn can_transition_to(&self, next: RecipientStatus) -> bool {
        use RecipientStatus::*;
        matches!(
            (self, next),
            (Queued, Sent) | (Queued, Failed) | (Sent, Opened) | (Sent, Failed) | (Opened, Accepted)
        )
    }
}

/// Campaign recipient record, unique per (campaign, email).
///
/// `invite_id` is set once the send step has issued the underlying
/// invite; queued recipients have none yet.
#[derive(Clone, Debug)]
pub struct CampaignRecipient {
    pub id: RecipientId,
    pub campaign_id: CampaignId,
    pub email: String,
    pub invite_id: Option<InviteId>,
    pub status: RecipientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for listing campaign recipients.
#[derive(Clone, Debug)]
pub struct RecipientQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    pub status: Option<RecipientStatus>,
    /// Case-insensitive substring match on the recipient email.
    pub search: Option<String>,
}

impl Default for RecipientQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 50,
            status: None,
            search: None,
        }
    }
}

/// One page of recipients plus the total count matching the filters.
#[derive(Clone, Debug)]
pub struct RecipientPage {
    pub recipients: Vec<CampaignRecipient>,
    pub total: u64,
}
