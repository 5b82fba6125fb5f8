use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use accred_storage::{
    Campaign, CampaignId, CampaignRecipient, CreateCampaignParams, CreateInstitutionParams,
    CreateInviteParams, CreateUserParams, DeclineReason, Institution, InstitutionId, Invite,
    InviteId, InviteUpdate, RecipientId, RecipientPage, RecipientQuery, RecipientStatus, Role,
    Store, StoreError, User, UserId,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

// ───────────────────────────── Row mapping helpers ─────────────────────────────

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map SQL errors, turning UNIQUE violations into `AlreadyExists`.
fn insert_err(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(backend_err)
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {}", secs)))
}

fn opt_ts(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    secs.map(from_ts).transpose()
}

fn parse_role(s: &str) -> Result<Role, StoreError> {
    s.parse().map_err(backend_err)
}

type UserRow = (
    String,         // id
    String,         // email
    String,         // display_name
    String,         // password_hash
    String,         // role
    Option<String>, // institution_id
    i64,            // created_at
    i64,            // updated_at
);

const USER_COLUMNS: &str =
    "id, email, display_name, password_hash, role, institution_id, created_at, updated_at";

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    let (id, email, display_name, password_hash, role, institution_id, created_at, updated_at) =
        row;
    Ok(User {
        id: UserId(parse_uuid(&id)?),
        email,
        display_name,
        password_hash,
        role: parse_role(&role)?,
        institution_id: institution_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(InstitutionId),
        created_at: from_ts(created_at)?,
        updated_at: from_ts(updated_at)?,
    })
}

type InviteRow = (
    String,         // id
    String,         // token_hash
    String,         // email
    String,         // role
    Option<String>, // institution_id
    i64,            // created_at
    i64,            // expires_at
    Option<i64>,    // viewed_at
    Option<i64>,    // used_at
    Option<i64>,    // declined_at
    Option<String>, // decline_reason
    Option<String>, // decline_note
    String,         // created_by
);

const INVITE_COLUMNS: &str = "id, token_hash, email, role, institution_id, created_at, \
     expires_at, viewed_at, used_at, declined_at, decline_reason, decline_note, created_by";

fn invite_from_row(row: InviteRow) -> Result<Invite, StoreError> {
    let (
        id,
        token_hash,
        email,
        role,
        institution_id,
        created_at,
        expires_at,
        viewed_at,
        used_at,
        declined_at,
        decline_reason,
        decline_note,
        created_by,
    ) = row;
    Ok(Invite {
        id: InviteId(parse_uuid(&id)?),
        token_hash,
        email,
        role: parse_role(&role)?,
        institution_id: institution_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(InstitutionId),
        created_at: from_ts(created_at)?,
        expires_at: from_ts(expires_at)?,
        viewed_at: opt_ts(viewed_at)?,
        used_at: opt_ts(used_at)?,
        declined_at: opt_ts(declined_at)?,
        decline_reason: decline_reason
            .as_deref()
            .map(|r| r.parse::<DeclineReason>().map_err(backend_err))
            .transpose()?,
        decline_note,
        created_by: UserId(parse_uuid(&created_by)?),
    })
}

type RecipientRow = (
    String,         // id
    String,         // campaign_id
    String,         // email
    Option<String>, // invite_id
    String,         // status
    i64,            // created_at
    i64,            // updated_at
);

const RECIPIENT_COLUMNS: &str = "id, campaign_id, email, invite_id, status, created_at, updated_at";

fn recipient_from_row(row: RecipientRow) -> Result<CampaignRecipient, StoreError> {
    let (id, campaign_id, email, invite_id, status, created_at, updated_at) = row;
    Ok(CampaignRecipient {
        id: RecipientId(parse_uuid(&id)?),
        campaign_id: CampaignId(parse_uuid(&campaign_id)?),
        email,
        invite_id: invite_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(InviteId),
        status: status
            .parse::<RecipientStatus>()
            .map_err(backend_err)?,
        created_at: from_ts(created_at)?,
        updated_at: from_ts(updated_at)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO users(id,email,display_name,password_hash,role,institution_id,created_at,updated_at)
             VALUES(?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.email)
        .bind(&params.display_name)
        .bind(&params.password_hash)
        .bind(params.role.as_str())
        .bind(params.institution_id.as_ref().map(|i| i.0.to_string()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        self.get_user_by_id(&UserId(id)).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email=?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(user_from_row).ok_or(StoreError::NotFound)?
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id=?",
            USER_COLUMNS
        ))
        .bind(user_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(user_from_row).ok_or(StoreError::NotFound)?
    }

    async fn link_user_role(
        &self,
        user_id: &UserId,
        role: Role,
        institution_id: Option<&InstitutionId>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET role=?, institution_id=?, updated_at=? WHERE id=?")
            .bind(role.as_str())
            .bind(institution_id.map(|i| i.0.to_string()))
            .bind(Utc::now().timestamp())
            .bind(user_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ───────────────────────────────────── Institutions ───────────────────────────────────

    async fn create_institution(
        &self,
        params: &CreateInstitutionParams,
    ) -> Result<Institution, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query("INSERT INTO institutions(id,name,created_at) VALUES(?,?,?)")
            .bind(id.to_string())
            .bind(&params.name)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(insert_err)?;

        self.get_institution(&InstitutionId(id)).await
    }

    async fn get_institution(
        &self,
        institution_id: &InstitutionId,
    ) -> Result<Institution, StoreError> {
        let row = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT id, name, created_at FROM institutions WHERE id=?",
        )
        .bind(institution_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((id, name, created_at)) => Ok(Institution {
                id: InstitutionId(parse_uuid(&id)?),
                name,
                created_at: from_ts(created_at)?,
            }),
        }
    }

    // ───────────────────────────────────── Invites ────────────────────────────────────────

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO invites(id,token_hash,email,role,institution_id,created_at,expires_at,created_by)
             VALUES(?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&params.token_hash)
        .bind(&params.email)
        .bind(params.role.as_str())
        .bind(params.institution_id.as_ref().map(|i| i.0.to_string()))
        .bind(now.timestamp())
        .bind(params.expires_at.timestamp())
        .bind(params.created_by.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        self.get_invite(&InviteId(id)).await
    }

    async fn get_invite_by_token(&self, token_hash: &str) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {} FROM invites WHERE token_hash=?",
            INVITE_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(invite_from_row).ok_or(StoreError::NotFound)?
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {} FROM invites WHERE id=?",
            INVITE_COLUMNS
        ))
        .bind(invite_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(invite_from_row).ok_or(StoreError::NotFound)?
    }

    async fn list_invites(
        &self,
        institution_id: Option<&InstitutionId>,
    ) -> Result<Vec<Invite>, StoreError> {
        let rows = match institution_id {
            Some(inst) => {
                sqlx::query_as::<_, InviteRow>(&format!(
                    "SELECT {} FROM invites WHERE institution_id=? ORDER BY created_at DESC, id",
                    INVITE_COLUMNS
                ))
                .bind(inst.0.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, InviteRow>(&format!(
                    "SELECT {} FROM invites ORDER BY created_at DESC, id",
                    INVITE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(backend_err)?;

        rows.into_iter().map(invite_from_row).collect()
    }

    async fn mark_invite_viewed(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE invites SET viewed_at=? WHERE token_hash=?")
            .bind(at.timestamp())
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn consume_invite(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        // First writer wins: the guard and the write are one statement,
        // so two racing accepts cannot both see an unconsumed row.
        let res = sqlx::query(
            "UPDATE invites SET used_at=?
             WHERE token_hash=? AND used_at IS NULL AND declined_at IS NULL",
        )
        .bind(at.timestamp())
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        if res.rows_affected() == 0 {
            return self.invite_write_failure(token_hash).await;
        }
        Ok(())
    }

    async fn decline_invite(
        &self,
        token_hash: &str,
        reason: Option<DeclineReason>,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE invites SET declined_at=?, decline_reason=?, decline_note=?
             WHERE token_hash=? AND used_at IS NULL AND declined_at IS NULL",
        )
        .bind(at.timestamp())
        .bind(reason.map(|r| r.as_str()))
        .bind(note)
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        if res.rows_affected() == 0 {
            return self.invite_write_failure(token_hash).await;
        }
        Ok(())
    }

    async fn update_invite(
        &self,
        invite_id: &InviteId,
        update: &InviteUpdate,
    ) -> Result<(), StoreError> {
        if update.role.is_none() && update.expires_at.is_none() {
            return Ok(());
        }

        let res = sqlx::query(
            "UPDATE invites
             SET role=COALESCE(?, role), expires_at=COALESCE(?, expires_at)
             WHERE id=? AND used_at IS NULL",
        )
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.expires_at.map(|t| t.timestamp()))
        .bind(invite_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        if res.rows_affected() == 0 {
            // Distinguish a missing invite from an already-used one.
            self.get_invite(invite_id).await?;
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn delete_invite(&self, invite_id: &InviteId) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM invites WHERE id=? AND used_at IS NULL")
            .bind(invite_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        if res.rows_affected() == 0 {
            self.get_invite(invite_id).await?;
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    // ───────────────────────────────────── Campaigns ──────────────────────────────────────

    async fn create_campaign(
        &self,
        params: &CreateCampaignParams,
    ) -> Result<Campaign, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO campaigns(id,institution_id,name,role,created_by,created_at)
             VALUES(?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(params.institution_id.as_ref().map(|i| i.0.to_string()))
        .bind(&params.name)
        .bind(params.role.as_str())
        .bind(params.created_by.0.to_string())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(insert_err)?;

        self.get_campaign(&CampaignId(id)).await
    }

    async fn get_campaign(&self, campaign_id: &CampaignId) -> Result<Campaign, StoreError> {
        let row = sqlx::query_as::<_, (String, Option<String>, String, String, String, i64)>(
            "SELECT id, institution_id, name, role, created_by, created_at
             FROM campaigns WHERE id=?",
        )
        .bind(campaign_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((id, institution_id, name, role, created_by, created_at)) => Ok(Campaign {
                id: CampaignId(parse_uuid(&id)?),
                institution_id: institution_id
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?
                    .map(InstitutionId),
                name,
                role: parse_role(&role)?,
                created_by: UserId(parse_uuid(&created_by)?),
                created_at: from_ts(created_at)?,
            }),
        }
    }

    async fn add_campaign_recipients(
        &self,
        campaign_id: &CampaignId,
        emails: &[String],
    ) -> Result<u32, StoreError> {
        self.get_campaign(campaign_id).await?;

        let now = Utc::now().timestamp();
        let mut inserted = 0u32;
        for email in emails {
            let res = sqlx::query(
                "INSERT OR IGNORE INTO campaign_recipients(id,campaign_id,email,status,created_at,updated_at)
                 VALUES(?,?,?,'queued',?,?)",
            )
            .bind(Uuid::now_v7().to_string())
            .bind(campaign_id.0.to_string())
            .bind(email)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
            inserted += res.rows_affected() as u32;
        }
        Ok(inserted)
    }

    async fn list_queued_recipients(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<Vec<CampaignRecipient>, StoreError> {
        let rows = sqlx::query_as::<_, RecipientRow>(&format!(
            "SELECT {} FROM campaign_recipients
             WHERE campaign_id=? AND status='queued' ORDER BY created_at, id",
            RECIPIENT_COLUMNS
        ))
        .bind(campaign_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_err)?;

        rows.into_iter().map(recipient_from_row).collect()
    }

    async fn list_campaign_recipients(
        &self,
        campaign_id: &CampaignId,
        query: &RecipientQuery,
    ) -> Result<RecipientPage, StoreError> {
        self.get_campaign(campaign_id).await?;

        let mut filters = String::from("campaign_id=?");
        if query.status.is_some() {
            filters.push_str(" AND status=?");
        }
        if query.search.is_some() {
            filters.push_str(" AND LOWER(email) LIKE ?");
        }

        let pattern = query
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.to_lowercase()));

        let count_sql = format!(
            "SELECT COUNT(*) FROM campaign_recipients WHERE {}",
            filters
        );
        let mut count_q =
            sqlx::query_as::<_, (i64,)>(&count_sql).bind(campaign_id.0.to_string());
        if let Some(status) = query.status {
            count_q = count_q.bind(status.as_str());
        }
        if let Some(p) = &pattern {
            count_q = count_q.bind(p);
        }
        let (total,) = count_q.fetch_one(&self.pool).await.map_err(backend_err)?;

        let limit = query.limit.max(1) as i64;
        let offset = (query.page.max(1) as i64 - 1) * limit;

        let page_sql = format!(
            "SELECT {} FROM campaign_recipients WHERE {} ORDER BY created_at, id LIMIT ? OFFSET ?",
            RECIPIENT_COLUMNS, filters
        );
        let mut page_q =
            sqlx::query_as::<_, RecipientRow>(&page_sql).bind(campaign_id.0.to_string());
        if let Some(status) = query.status {
            page_q = page_q.bind(status.as_str());
        }
        if let Some(p) = &pattern {
            page_q = page_q.bind(p);
        }
        let rows = page_q
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

        Ok(RecipientPage {
            recipients: rows
                .into_iter()
                .map(recipient_from_row)
                .collect::<Result<_, _>>()?,
            total: total as u64,
        })
    }

    async fn get_recipient_by_invite(
        &self,
        invite_id: &InviteId,
    ) -> Result<CampaignRecipient, StoreError> {
        let row = sqlx::query_as::<_, RecipientRow>(&format!(
            "SELECT {} FROM campaign_recipients WHERE invite_id=?",
            RECIPIENT_COLUMNS
        ))
        .bind(invite_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?;

        row.map(recipient_from_row).ok_or(StoreError::NotFound)?
    }

    async fn advance_recipient(
        &self,
        recipient_id: &RecipientId,
        to: RecipientStatus,
        invite_id: Option<&InviteId>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Legal predecessors of the target state; the guard rides in
        // the WHERE clause so a stale caller loses cleanly.
        let from: Vec<&str> = [
            RecipientStatus::Queued,
            RecipientStatus::Sent,
            RecipientStatus::Opened,
            RecipientStatus::Accepted,
            RecipientStatus::Failed,
        ]
        .iter()
        .filter(|s| s.can_transition_to(to))
        .map(|s| s.as_str())
        .collect();

        if from.is_empty() {
            return Err(StoreError::Conflict);
        }

        let placeholders = vec!["?"; from.len()].join(",");
        let sql = format!(
            "UPDATE campaign_recipients
             SET status=?, invite_id=COALESCE(?, invite_id), updated_at=?
             WHERE id=? AND status IN ({})",
            placeholders
        );
        let mut q = sqlx::query(&sql)
            .bind(to.as_str())
        .bind(invite_id.map(|i| i.0.to_string()))
        .bind(at.timestamp())
        .bind(recipient_id.0.to_string());
        for s in &from {
            q = q.bind(*s);
        }

        let res = q.execute(&self.pool).await.map_err(backend_err)?;
        if res.rows_affected() == 0 {
            let exists = sqlx::query_as::<_, (i64,)>(
                "SELECT COUNT(*) FROM campaign_recipients WHERE id=?",
            )
            .bind(recipient_id.0.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
            return if exists.0 == 0 {
                Err(StoreError::NotFound)
            } else {
                Err(StoreError::Conflict)
            };
        }
        Ok(())
    }
}

impl SqliteStore {
    /// A consume/decline touched zero rows: either the invite does not
    /// exist, or another writer already settled it.
    async fn invite_write_failure(&self, token_hash: &str) -> Result<(), StoreError> {
        let exists =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM invites WHERE token_hash=?")
                .bind(token_hash)
                .fetch_one(&self.pool)
                .await
                .map_err(backend_err)?;
        if exists.0 == 0 {
            Err(StoreError::NotFound)
        } else {
            Err(StoreError::Conflict)
        }
    }
}
