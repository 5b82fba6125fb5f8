//! User types.

use chrono::{DateTime, Utc};

use super::{InstitutionId, Role, UserId};

/// User record
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    pub institution_id: Option<InstitutionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a user
#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    pub institution_id: Option<InstitutionId>,
}
