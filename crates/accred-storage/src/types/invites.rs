//! Invite types and lifecycle status derivation.

use chrono::{DateTime, Duration, Utc};

use super::{DeclineReason, InstitutionId, InviteId, Role, UserId};

/// Default invite lifetime, applied at creation and when an admin
/// extends an expired-but-unused invite.
pub const INVITE_TTL_DAYS: i64 = 7;

/// Compute the expiry for an invite issued (or re-issued) at `from`.
pub fn default_expiry(from: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::days(INVITE_TTL_DAYS)
}

/// Invite record.
///
/// The plaintext token is never persisted; `token_hash` is the SHA-256
/// of the secret embedded in the invite link and is the sole lookup key.
#[derive(Clone, Debug)]
pub struct Invite {
    pub id: InviteId,
    pub token_hash: String,
    pub email: String,
    pub role: Role,
    pub institution_id: Option<InstitutionId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<DeclineReason>,
    pub decline_note: Option<String>,
    pub created_by: UserId,
}

/// Derived lifecycle state of an invite. There is no stored status
/// column; the state is reconstructed from the timestamps on read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InviteStatus {
    Pending,
    Used,
    Declined,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Used => "used",
            InviteStatus::Declined => "declined",
            InviteStatus::Expired => "expired",
        }
    }
}

impl Invite {
    /// Derive the lifecycle status at `now`.
    ///
    /// Precedence is Used > Declined > Expired > Pending: an invite that
    /// was accepted and has since passed its expiry still reports Used,
    /// because acceptance already happened and is irreversible.
    pub fn status(&self, now: DateTime<Utc>) -> InviteStatus {
        if self.used_at.is_some() {
            InviteStatus::Used
        } else if self.declined_at.is_some() {
            InviteStatus::Declined
        } else if now > self.expires_at {
            InviteStatus::Expired
        } else {
            InviteStatus::Pending
        }
    }
}

/// Parameters for creating an invite
#[derive(Clone, Debug)]
pub struct CreateInviteParams {
    pub token_hash: String,
    pub email: String,
    pub role: Role,
    pub institution_id: Option<InstitutionId>,
    pub expires_at: DateTime<Utc>,
    pub created_by: UserId,
}

/// Administrative changes to an unused invite.
#[derive(Clone, Debug, Default)]
pub struct InviteUpdate {
    pub role: Option<Role>,
    /// New expiry, replacing the current one outright.
    pub expires_at: Option<DateTime<Utc>>,
}
