//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait the server depends on.
///
/// Single-consumption guarantees (an invite is used or declined at most
/// once, first writer wins) are the backend's responsibility: the
/// consume/decline methods must be conditional writes, not read-modify-
/// write in application code, because no in-process mutual exclusion
/// exists across requests.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Create a new user. Email is unique; a duplicate maps to `AlreadyExists`.
    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError>;

    /// Get user by email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Get user by ID.
    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Re-bind an existing account's role and institution (invite
    /// acceptance by an already-registered email).
    async fn link_user_role(
        &self,
        user_id: &UserId,
        role: Role,
        institution_id: Option<&InstitutionId>,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Institutions ───────────────────────────────────

    /// Create an institution (returns the full record).
    async fn create_institution(
        &self,
        params: &CreateInstitutionParams,
    ) -> Result<Institution, StoreError>;

    /// Get institution by ID.
    async fn get_institution(
        &self,
        institution_id: &InstitutionId,
    ) -> Result<Institution, StoreError>;

    // ───────────────────────────────────── Invites ────────────────────────────────────────

    /// Create an invite (token hash must be unique).
    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError>;

    /// Get invite by token hash.
    async fn get_invite_by_token(&self, token_hash: &str) -> Result<Invite, StoreError>;

    /// Get invite by ID.
    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError>;

    /// List invites, optionally restricted to one institution.
    async fn list_invites(
        &self,
        institution_id: Option<&InstitutionId>,
    ) -> Result<Vec<Invite>, StoreError>;

    /// Record that the invite landing page was viewed. Overwrites any
    /// earlier view timestamp; a missing invite is `NotFound` and the
    /// caller decides whether that matters.
    async fn mark_invite_viewed(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark an invite used. Conditional write: succeeds only while the
    /// invite is neither used nor declined; a lost race is `Conflict`.
    async fn consume_invite(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Mark an invite declined, optionally recording why. Same
    /// conditional-write contract as [`Store::consume_invite`].
    async fn decline_invite(
        &self,
        token_hash: &str,
        reason: Option<DeclineReason>,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Apply administrative changes to an invite. Conditional on the
    /// invite being unused; editing a used invite is `Conflict`.
    async fn update_invite(
        &self,
        invite_id: &InviteId,
        update: &InviteUpdate,
    ) -> Result<(), StoreError>;

    /// Delete an unused invite. Deleting a used invite is `Conflict`.
    async fn delete_invite(&self, invite_id: &InviteId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Campaigns ──────────────────────────────────────

    /// Create a campaign (returns the full record).
    async fn create_campaign(&self, params: &CreateCampaignParams)
        -> Result<Campaign, StoreError>;

    /// Get campaign by ID.
    async fn get_campaign(&self, campaign_id: &CampaignId) -> Result<Campaign, StoreError>;

    /// Add recipients in state `queued`, deduplicated per campaign by
    /// email. Returns the number actually inserted.
    async fn add_campaign_recipients(
        &self,
        campaign_id: &CampaignId,
        emails: &[String],
    ) -> Result<u32, StoreError>;

    /// Recipients of a campaign still waiting to be sent.
    async fn list_queued_recipients(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<CampaignRecipient>, StoreError>;

    /// Paginated, filterable recipient listing with a total count.
    async fn list_campaign_recipients(
        &self,
        campaign_id: &CampaignId,
        query: &RecipientQuery,
    ) -> Result<RecipientPage, StoreError>;

    /// Look up the recipient backed by a given invite.
    async fn get_recipient_by_invite(
        &self,
        invite_id: &InviteId,
    ) -> Result<CampaignRecipient, StoreError>;

    /// Advance a recipient's status. The transition guard is enforced
    /// in the write itself; an illegal move is `Conflict`.
    async fn advance_recipient(
        &self,
        recipient_id: &RecipientId,
        to: RecipientStatus,
        invite_id: Option<&InviteId>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
