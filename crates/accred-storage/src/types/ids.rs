//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use uuid::Uuid;

/// User identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

/// Institution identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstitutionId(pub Uuid);

/// Invite identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InviteId(pub Uuid);

/// Campaign identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CampaignId(pub Uuid);

/// Campaign recipient identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecipientId(pub Uuid);
