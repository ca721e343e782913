//! PostgreSQL backend for studyhub.
//!
//! `lock_group` and `lock_user` take row locks with `SELECT ... FOR UPDATE`.
//! Callers lock the group before the user so two operations never wait on
//! each other in opposite order.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgExecutor, PgPool, QueryBuilder, Transaction};
use uuid::Uuid;

use studyhub_activity::{ActivityEntry, ActivityFilter, ActivityId, ActivityLog, ActivityLogError};
use studyhub_storage::{
    ActivityRecord, CreateGroupParams, CreateNoticeParams, CreateRequestParams, CreateUserParams,
    Group, GroupId, GroupSummary, MemberProfile, Membership, MembershipId, MembershipRequest,
    MembershipStatus, Notice, NoticeId, RequestId, RequestStatus, Store, StoreError, UnitOfWork,
    UpdateGroupParams, UpdateNoticeParams, UpdateProfileParams, User, UserId, WhitelistEntry,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(StoreError::backend)?;

        MIGRATOR.run(&pool).await.map_err(StoreError::backend)?;

        Ok(Self { pool })
    }
}

const USER_COLUMNS: &str = "id, email, name, password_hash, bio, github_url, blog_url, verified, created_at, updated_at";
const GROUP_COLUMNS: &str =
    "id, name, description, purpose, max_members, leader_id, is_active, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str = "id, group_id, user_id, status, joined_at, updated_at";
const REQUEST_COLUMNS: &str = "id, group_id, user_id, status, message, response_message, created_at, updated_at, expires_at";
const NOTICE_COLUMNS: &str =
    "id, group_id, author_id, kind, title, content, pinned, created_at, updated_at";
const ACTIVITY_COLUMNS: &str = "id, actor_id, group_id, action, message, metadata, created_at";

fn write_err(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::AlreadyExists,
        _ => StoreError::backend(e),
    }
}

// ───────────────────────────────────── Rows ──────────────────────────────────────

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    bio: Option<String>,
    github_url: Option<String>,
    blog_url: Option<String>,
    verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            bio: row.bio,
            github_url: row.github_url,
            blog_url: row.blog_url,
            verified: row.verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    purpose: String,
    max_members: i32,
    leader_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = StoreError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            id: GroupId(row.id),
            name: row.name,
            description: row.description,
            purpose: row.purpose.parse()?,
            max_members: u32::try_from(row.max_members).map_err(StoreError::backend)?,
            leader_id: UserId(row.leader_id),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GroupSummaryRow {
    #[sqlx(flatten)]
    group: GroupRow,
    member_count: i64,
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    group_id: Uuid,
    user_id: Uuid,
    status: String,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            id: MembershipId(row.id),
            group_id: GroupId(row.group_id),
            user_id: UserId(row.user_id),
            status: row.status.parse()?,
            joined_at: row.joined_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberProfileRow {
    membership_id: Uuid,
    user_id: Uuid,
    email: String,
    name: String,
    joined_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    group_id: Uuid,
    user_id: Uuid,
    status: String,
    message: String,
    response_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for MembershipRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(MembershipRequest {
            id: RequestId(row.id),
            group_id: GroupId(row.group_id),
            user_id: UserId(row.user_id),
            status: row.status.parse()?,
            message: row.message,
            response_message: row.response_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NoticeRow {
    id: Uuid,
    group_id: Uuid,
    author_id: Uuid,
    kind: String,
    title: String,
    content: String,
    pinned: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NoticeRow> for Notice {
    type Error = StoreError;

    fn try_from(row: NoticeRow) -> Result<Self, Self::Error> {
        Ok(Notice {
            id: NoticeId(row.id),
            group_id: GroupId(row.group_id),
            author_id: UserId(row.author_id),
            kind: row.kind.parse()?,
            title: row.title,
            content: row.content,
            pinned: row.pinned,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    actor_id: Uuid,
    group_id: Option<Uuid>,
    action: String,
    message: String,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityRecord {
    fn from(row: ActivityRow) -> Self {
        ActivityRecord {
            id: row.id,
            actor_id: UserId(row.actor_id),
            group_id: row.group_id.map(GroupId),
            action: row.action,
            message: row.message,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ──────────────────────────── Shared queries (pool or txn) ────────────────────────────

async fn fetch_user<'e>(
    exec: impl PgExecutor<'e>,
    id: &UserId,
    for_update: bool,
) -> Result<User, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1{lock}");
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(id.0)
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .map(User::from)
        .ok_or(StoreError::NotFound)
}

async fn fetch_group<'e>(
    exec: impl PgExecutor<'e>,
    id: &GroupId,
    for_update: bool,
) -> Result<Group, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {GROUP_COLUMNS} FROM study_groups WHERE id = $1{lock}");
    sqlx::query_as::<_, GroupRow>(&sql)
        .bind(id.0)
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

async fn count_members<'e>(exec: impl PgExecutor<'e>, id: &GroupId) -> Result<u32, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM memberships WHERE group_id = $1 AND status = 'ACTIVE'",
    )
    .bind(id.0)
    .fetch_one(exec)
    .await
    .map_err(StoreError::backend)?;
    u32::try_from(count).map_err(StoreError::backend)
}

async fn fetch_active_membership<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &UserId,
) -> Result<Option<Membership>, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 AND status = 'ACTIVE'"
    );
    sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(user_id.0)
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .map(Membership::try_from)
        .transpose()
}

async fn fetch_request<'e>(
    exec: impl PgExecutor<'e>,
    id: &RequestId,
) -> Result<MembershipRequest, StoreError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE id = $1");
    sqlx::query_as::<_, RequestRow>(&sql)
        .bind(id.0)
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

async fn fetch_notice<'e>(exec: impl PgExecutor<'e>, id: &NoticeId) -> Result<Notice, StoreError> {
    let sql = format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = $1");
    sqlx::query_as::<_, NoticeRow>(&sql)
        .bind(id.0)
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

// ───────────────────────────────────── Store ─────────────────────────────────────

#[async_trait::async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        fetch_user(&self.pool, user_id, false).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .map(User::from)
            .ok_or(StoreError::NotFound)
    }

    // ─────────────────────────── Whitelist ───────────────────────────

    async fn add_whitelisted_email(
        &self,
        email: &str,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO email_whitelist(email, note) VALUES($1, $2)")
            .bind(email)
            .bind(note)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn remove_whitelisted_email(&self, email: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM email_whitelist WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_whitelisted_emails(&self) -> Result<Vec<WhitelistEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (String, Option<String>, DateTime<Utc>)>(
            "SELECT email, note, created_at FROM email_whitelist ORDER BY created_at, email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows
            .into_iter()
            .map(|(email, note, created_at)| WhitelistEntry {
                email,
                note,
                created_at,
            })
            .collect())
    }

    // ───────────────────────────── Groups ────────────────────────────

    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError> {
        fetch_group(&self.pool, group_id, false).await
    }

    async fn list_groups(&self) -> Result<Vec<GroupSummary>, StoreError> {
        let rows = sqlx::query_as::<_, GroupSummaryRow>(
            "SELECT g.id, g.name, g.description, g.purpose, g.max_members, g.leader_id,
                    g.is_active, g.created_at, g.updated_at,
                    (SELECT COUNT(*) FROM memberships m
                      WHERE m.group_id = g.id AND m.status = 'ACTIVE') AS member_count
               FROM study_groups g
              WHERE g.is_active
              ORDER BY g.created_at DESC, g.id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(GroupSummary {
                    member_count: u32::try_from(row.member_count).map_err(StoreError::backend)?,
                    group: row.group.try_into()?,
                })
            })
            .collect()
    }

    async fn count_active_members(&self, group_id: &GroupId) -> Result<u32, StoreError> {
        count_members(&self.pool, group_id).await
    }

    async fn list_group_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<MemberProfile>, StoreError> {
        let rows = sqlx::query_as::<_, MemberProfileRow>(
            "SELECT m.id AS membership_id, u.id AS user_id, u.email, u.name, m.joined_at
               FROM memberships m
               JOIN users u ON u.id = m.user_id
              WHERE m.group_id = $1 AND m.status = 'ACTIVE'
              ORDER BY m.joined_at, m.id",
        )
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows
            .into_iter()
            .map(|row| MemberProfile {
                membership_id: MembershipId(row.membership_id),
                user_id: UserId(row.user_id),
                email: row.email,
                name: row.name,
                joined_at: row.joined_at,
            })
            .collect())
    }

    async fn get_active_membership(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        fetch_active_membership(&self.pool, user_id).await
    }

    // ──────────────────────────── Requests ───────────────────────────

    async fn get_request(&self, request_id: &RequestId) -> Result<MembershipRequest, StoreError> {
        fetch_request(&self.pool, request_id).await
    }

    async fn list_group_requests(
        &self,
        group_id: &GroupId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE group_id = "
        ));
        qb.push_bind(group_id.0);
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build_query_as::<RequestRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }

    async fn list_user_requests(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests
              WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }

    // ───────────────────────────── Notices ───────────────────────────

    async fn get_notice(&self, notice_id: &NoticeId) -> Result<Notice, StoreError> {
        fetch_notice(&self.pool, notice_id).await
    }

    async fn list_notices(&self, group_id: &GroupId) -> Result<Vec<Notice>, StoreError> {
        let sql = format!(
            "SELECT {NOTICE_COLUMNS} FROM notices
              WHERE group_id = $1 ORDER BY pinned DESC, created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, NoticeRow>(&sql)
            .bind(group_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }
}

// ────────────────────────────────── Unit of work ─────────────────────────────────

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_group(&mut self, group_id: &GroupId) -> Result<Group, StoreError> {
        fetch_group(&mut *self.tx, group_id, true).await
    }

    async fn lock_user(&mut self, user_id: &UserId) -> Result<User, StoreError> {
        fetch_user(&mut *self.tx, user_id, true).await
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn is_email_whitelisted(&mut self, email: &str) -> Result<bool, StoreError> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM email_whitelist WHERE email = $1)")
                .bind(email)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(StoreError::backend)?;
        Ok(found)
    }

    async fn insert_user(&mut self, params: &CreateUserParams) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users(id, email, name, password_hash, verified)
             VALUES($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(&params.email)
            .bind(&params.name)
            .bind(&params.password_hash)
            .bind(params.verified)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_err)?;
        Ok(row.into())
    }

    async fn update_profile(
        &mut self,
        user_id: &UserId,
        params: &UpdateProfileParams,
    ) -> Result<User, StoreError> {
        let sql = format!(
            "UPDATE users
                SET name = COALESCE($1, name),
                    bio = COALESCE($2, bio),
                    github_url = COALESCE($3, github_url),
                    blog_url = COALESCE($4, blog_url),
                    updated_at = now()
              WHERE id = $5
          RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(params.name.as_deref())
            .bind(params.bio.as_deref())
            .bind(params.github_url.as_deref())
            .bind(params.blog_url.as_deref())
            .bind(user_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .map(User::from)
            .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Groups ────────────────────────────

    async fn find_active_group_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<Group>, StoreError> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM study_groups WHERE name = $1 AND is_active");
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .map(Group::try_from)
            .transpose()
    }

    async fn find_group_led_by(&mut self, user_id: &UserId) -> Result<Option<Group>, StoreError> {
        let sql =
            format!("SELECT {GROUP_COLUMNS} FROM study_groups WHERE leader_id = $1 AND is_active");
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(user_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .map(Group::try_from)
            .transpose()
    }

    async fn insert_group(&mut self, params: &CreateGroupParams) -> Result<Group, StoreError> {
        let sql = format!(
            "INSERT INTO study_groups(id, name, description, purpose, max_members, leader_id)
             VALUES($1, $2, $3, $4, $5, $6) RETURNING {GROUP_COLUMNS}"
        );
        let max_members = i32::try_from(params.max_members).map_err(StoreError::backend)?;
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(&params.name)
            .bind(params.description.as_deref())
            .bind(params.purpose.as_str())
            .bind(max_members)
            .bind(params.leader_id.0)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_err)?
            .try_into()
    }

    async fn update_group(
        &mut self,
        group_id: &GroupId,
        params: &UpdateGroupParams,
    ) -> Result<Group, StoreError> {
        let max_members = params
            .max_members
            .map(i32::try_from)
            .transpose()
            .map_err(StoreError::backend)?;
        let sql = format!(
            "UPDATE study_groups
                SET description = COALESCE($1, description),
                    purpose = COALESCE($2, purpose),
                    max_members = COALESCE($3, max_members),
                    updated_at = now()
              WHERE id = $4
          RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(params.description.as_deref())
            .bind(params.purpose.map(|p| p.as_str()))
            .bind(max_members)
            .bind(group_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn deactivate_group(&mut self, group_id: &GroupId) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE study_groups SET is_active = FALSE, updated_at = now() WHERE id = $1")
                .bind(group_id.0)
                .execute(&mut *self.tx)
                .await
                .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ─────────────────────────── Memberships ─────────────────────────

    async fn count_active_members(&mut self, group_id: &GroupId) -> Result<u32, StoreError> {
        count_members(&mut *self.tx, group_id).await
    }

    async fn find_active_membership(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        fetch_active_membership(&mut *self.tx, user_id).await
    }

    async fn list_active_memberships(
        &mut self,
        group_id: &GroupId,
    ) -> Result<Vec<Membership>, StoreError> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships
              WHERE group_id = $1 AND status = 'ACTIVE' ORDER BY joined_at, id"
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(group_id.0)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }

    async fn insert_membership(
        &mut self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Membership, StoreError> {
        let sql = format!(
            "INSERT INTO memberships(id, group_id, user_id, status)
             VALUES($1, $2, $3, 'ACTIVE') RETURNING {MEMBERSHIP_COLUMNS}"
        );
        sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(group_id.0)
            .bind(user_id.0)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_err)?
            .try_into()
    }

    async fn end_membership(
        &mut self,
        membership_id: &MembershipId,
        status: MembershipStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE memberships SET status = $1, updated_at = now()
              WHERE id = $2 AND status = 'ACTIVE'",
        )
        .bind(status.as_str())
        .bind(membership_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    // ──────────────────────────── Requests ───────────────────────────

    async fn get_request(
        &mut self,
        request_id: &RequestId,
    ) -> Result<MembershipRequest, StoreError> {
        fetch_request(&mut *self.tx, request_id).await
    }

    async fn find_pending_request(
        &mut self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<MembershipRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests
              WHERE group_id = $1 AND user_id = $2 AND status = 'PENDING'"
        );
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(group_id.0)
            .bind(user_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .map(MembershipRequest::try_from)
            .transpose()
    }

    async fn insert_request(
        &mut self,
        params: &CreateRequestParams,
    ) -> Result<MembershipRequest, StoreError> {
        let sql = format!(
            "INSERT INTO membership_requests(id, group_id, user_id, status, message, expires_at)
             VALUES($1, $2, $3, 'PENDING', $4, $5) RETURNING {REQUEST_COLUMNS}"
        );
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(params.group_id.0)
            .bind(params.user_id.0)
            .bind(&params.message)
            .bind(params.expires_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_err)?
            .try_into()
    }

    async fn decide_request(
        &mut self,
        request_id: &RequestId,
        status: RequestStatus,
        response_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE membership_requests
                SET status = $1, response_message = COALESCE($2, response_message), updated_at = now()
              WHERE id = $3 AND status = 'PENDING'",
        )
        .bind(status.as_str())
        .bind(response_message)
        .bind(request_id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    async fn list_pending_requests(
        &mut self,
        group_id: &GroupId,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests
              WHERE group_id = $1 AND status = 'PENDING' ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(group_id.0)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }

    async fn list_stale_pending_requests(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests
              WHERE status = 'PENDING' AND expires_at <= $1
              ORDER BY expires_at, id
                FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }

    // ───────────────────────────── Notices ───────────────────────────

    async fn get_notice(&mut self, notice_id: &NoticeId) -> Result<Notice, StoreError> {
        fetch_notice(&mut *self.tx, notice_id).await
    }

    async fn insert_notice(&mut self, params: &CreateNoticeParams) -> Result<Notice, StoreError> {
        let sql = format!(
            "INSERT INTO notices(id, group_id, author_id, kind, title, content, pinned)
             VALUES($1, $2, $3, $4, $5, $6, $7) RETURNING {NOTICE_COLUMNS}"
        );
        sqlx::query_as::<_, NoticeRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(params.group_id.0)
            .bind(params.author_id.0)
            .bind(params.kind.as_str())
            .bind(&params.title)
            .bind(&params.content)
            .bind(params.pinned)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(write_err)?
            .try_into()
    }

    async fn update_notice(
        &mut self,
        notice_id: &NoticeId,
        params: &UpdateNoticeParams,
    ) -> Result<Notice, StoreError> {
        let sql = format!(
            "UPDATE notices
                SET kind = COALESCE($1, kind),
                    title = COALESCE($2, title),
                    content = COALESCE($3, content),
                    updated_at = now()
              WHERE id = $4
          RETURNING {NOTICE_COLUMNS}"
        );
        sqlx::query_as::<_, NoticeRow>(&sql)
            .bind(params.kind.map(|k| k.as_str()))
            .bind(params.title.as_deref())
            .bind(params.content.as_deref())
            .bind(notice_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn set_notice_pinned(
        &mut self,
        notice_id: &NoticeId,
        pinned: bool,
    ) -> Result<Notice, StoreError> {
        let sql = format!(
            "UPDATE notices SET pinned = $1, updated_at = now()
              WHERE id = $2 RETURNING {NOTICE_COLUMNS}"
        );
        sqlx::query_as::<_, NoticeRow>(&sql)
            .bind(pinned)
            .bind(notice_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn delete_notice(&mut self, notice_id: &NoticeId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM notices WHERE id = $1")
            .bind(notice_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ──────────────────────────── Activity ───────────────────────────

    async fn append_activity(&mut self, record: &ActivityRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO activity_logs(id, actor_id, group_id, action, message, metadata, created_at)
             VALUES($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.actor_id.0)
        .bind(record.group_id.map(|g| g.0))
        .bind(&record.action)
        .bind(&record.message)
        .bind(record.metadata.clone())
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::backend)
    }
}

// ──────────────────────────────────── Activity log ────────────────────────────────────

fn push_activity_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ActivityFilter) {
    if let Some(actor) = &filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor.0);
    }
    if let Some(group) = &filter.group_id {
        qb.push(" AND group_id = ").push_bind(group.0);
    }
    if let Some(action) = &filter.action {
        qb.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at < ").push_bind(to);
    }
}

#[async_trait::async_trait]
impl ActivityLog for PostgresStore {
    async fn query(&self, filter: ActivityFilter) -> Result<Vec<ActivityEntry>, ActivityLogError> {
        let limit = filter.effective_limit()?;
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_logs WHERE TRUE"
        ));
        push_activity_filter(&mut qb, &filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.effective_offset()));

        let rows = qb
            .build_query_as::<ActivityRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ActivityLogError::Database(e.to_string()))?;
        rows.into_iter()
            .map(|row| ActivityEntry::try_from(ActivityRecord::from(row)))
            .collect()
    }

    async fn get(&self, id: ActivityId) -> Result<ActivityEntry, ActivityLogError> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activity_logs WHERE id = $1");
        let row = sqlx::query_as::<_, ActivityRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ActivityLogError::Database(e.to_string()))?
            .ok_or(ActivityLogError::NotFound(id))?;
        ActivityEntry::try_from(ActivityRecord::from(row))
    }

    async fn count(&self, filter: ActivityFilter) -> Result<u64, ActivityLogError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM activity_logs WHERE TRUE");
        push_activity_filter(&mut qb, &filter);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ActivityLogError::Database(e.to_string()))?;
        u64::try_from(count).map_err(|e| ActivityLogError::Database(e.to_string()))
    }
}
