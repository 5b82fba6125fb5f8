//! Role and decline-reason enumerations.

use std::str::FromStr;

/// Platform role granted by an invite.
///
/// Institution-scoped roles bind the holder to a single institution;
/// platform-wide roles do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    PlatformAdmin,
    InstitutionAdmin,
    InstitutionStaff,
    Student,
    QctoAdmin,
    QctoReviewer,
}

/// Error type for parsing Role from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid role: {}", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLATFORM_ADMIN" => Ok(Role::PlatformAdmin),
            "INSTITUTION_ADMIN" => Ok(Role::InstitutionAdmin),
            "INSTITUTION_STAFF" => Ok(Role::InstitutionStaff),
            "STUDENT" => Ok(Role::Student),
            "QCTO_ADMIN" => Ok(Role::QctoAdmin),
            "QCTO_REVIEWER" => Ok(Role::QctoReviewer),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformAdmin => "PLATFORM_ADMIN",
            Role::InstitutionAdmin => "INSTITUTION_ADMIN",
            Role::InstitutionStaff => "INSTITUTION_STAFF",
            Role::Student => "STUDENT",
            Role::QctoAdmin => "QCTO_ADMIN",
            Role::QctoReviewer => "QCTO_REVIEWER",
        }
    }

    /// Whether this role binds its holder to an institution.
    pub fn is_institution_scoped(&self) -> bool {
        matches!(
            self,
            Role::InstitutionAdmin | Role::InstitutionStaff | Role::Student
        )
    }

    /// Whether a holder of this role may issue and manage invites.
    pub fn can_manage_invites(&self) -> bool {
        matches!(self, Role::PlatformAdmin | Role::InstitutionAdmin)
    }
}

/// Reason recorded when an invite is declined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclineReason {
    AlreadyUsingOtherPlatform,
    NotResponsible,
    NotInterested,
    ManualProcess,
    NotReady,
    Other,
}

/// Error type for parsing DeclineReason from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDeclineReasonError(pub String);

impl std::fmt::Display for ParseDeclineReasonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid decline reason: {}", self.0)
    }
}

impl std::error::Error for ParseDeclineReasonError {}

impl FromStr for DeclineReason {
    type Err = ParseDeclineReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "already-using-other-platform" => Ok(DeclineReason::AlreadyUsingOtherPlatform),
            "not-responsible" => Ok(DeclineReason::NotResponsible),
            "not-interested" => Ok(DeclineReason::NotInterested),
            "manual-process" => Ok(DeclineReason::ManualProcess),
            "not-ready" => Ok(DeclineReason::NotReady),
            "other" => Ok(DeclineReason::Other),
            _ => Err(ParseDeclineReasonError(s.to_string())),
        }
    }
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::AlreadyUsingOtherPlatform => "already-using-other-platform",
            DeclineReason::NotResponsible => "not-responsible",
            DeclineReason::NotInterested => "not-interested",
            DeclineReason::ManualProcess => "manual-process",
            DeclineReason::NotReady => "not-ready",
            DeclineReason::Other => "other",
        }
    }
}
