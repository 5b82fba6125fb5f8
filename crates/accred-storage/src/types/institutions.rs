//! Institution types.

use chrono::{DateTime, Utc};

use super::InstitutionId;

/// Institution record
#[derive(Clone, Debug)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an institution
#[derive(Clone, Debug)]
pub struct CreateInstitutionParams {
    pub name: String,
}
