//! SQLite backend for studyhub.
//!
//! The pool holds a single connection. A [`UnitOfWork`] keeps that connection
//! for its whole lifetime, so units of work never interleave inside one
//! process. `lock_group` / `lock_user` additionally take SQLite's write lock
//! up front so a second process (e.g. the admin CLI) waits instead of racing.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqliteExecutor, SqlitePool, Transaction};
use uuid::Uuid;

use studyhub_activity::{ActivityEntry, ActivityFilter, ActivityId, ActivityLog, ActivityLogError};
use studyhub_storage::{
    ActivityRecord, CreateGroupParams, CreateNoticeParams, CreateRequestParams, CreateUserParams,
    Group, GroupId, GroupSummary, MemberProfile, Membership, MembershipId, MembershipRequest,
    MembershipStatus, Notice, NoticeId, RequestId, RequestStatus, Store, StoreError, UnitOfWork,
    UpdateGroupParams, UpdateNoticeParams, UpdateProfileParams, User, UserId, WhitelistEntry,
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
        // One connection: in-memory databases live and die with it, and it
        // serializes units of work.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(StoreError::backend)?;

        MIGRATOR.run(&pool).await.map_err(StoreError::backend)?;

        Ok(Self { pool })
    }
}

// ───────────────────────────────────── Rows ──────────────────────────────────────

const USER_COLUMNS: &str = "id, email, name, password_hash, bio, github_url, blog_url, verified, created_at, updated_at";
const GROUP_COLUMNS: &str =
    "id, name, description, purpose, max_members, leader_id, is_active, created_at, updated_at";
const MEMBERSHIP_COLUMNS: &str = "id, group_id, user_id, status, joined_at, updated_at";
const REQUEST_COLUMNS: &str = "id, group_id, user_id, status, message, response_message, created_at, updated_at, expires_at";
const NOTICE_COLUMNS: &str =
    "id, group_id, author_id, kind, title, content, pinned, created_at, updated_at";
const ACTIVITY_COLUMNS: &str = "id, actor_id, group_id, action, message, metadata, created_at";

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(StoreError::backend)
}

/// Unique-constraint violations become `AlreadyExists`; everything else is a backend error.
fn write_err(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::AlreadyExists,
        _ => StoreError::backend(e),
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
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

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId(parse_uuid(&row.id)?),
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            bio: row.bio,
            github_url: row.github_url,
            blog_url: row.blog_url,
            verified: row.verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    description: Option<String>,
    purpose: String,
    max_members: i64,
    leader_id: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = StoreError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            id: GroupId(parse_uuid(&row.id)?),
            name: row.name,
            description: row.description,
            purpose: row.purpose.parse()?,
            max_members: u32::try_from(row.max_members).map_err(StoreError::backend)?,
            leader_id: UserId(parse_uuid(&row.leader_id)?),
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
    id: String,
    group_id: String,
    user_id: String,
    status: String,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            id: MembershipId(parse_uuid(&row.id)?),
            group_id: GroupId(parse_uuid(&row.group_id)?),
            user_id: UserId(parse_uuid(&row.user_id)?),
            status: row.status.parse()?,
            joined_at: row.joined_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberProfileRow {
    membership_id: String,
    user_id: String,
    email: String,
    name: String,
    joined_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    group_id: String,
    user_id: String,
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
            id: RequestId(parse_uuid(&row.id)?),
            group_id: GroupId(parse_uuid(&row.group_id)?),
            user_id: UserId(parse_uuid(&row.user_id)?),
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
    id: String,
    group_id: String,
    author_id: String,
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
            id: NoticeId(parse_uuid(&row.id)?),
            group_id: GroupId(parse_uuid(&row.group_id)?),
            author_id: UserId(parse_uuid(&row.author_id)?),
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
    id: String,
    actor_id: String,
    group_id: Option<String>,
    action: String,
    message: String,
    metadata: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = StoreError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let metadata = row
            .metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(StoreError::backend)?;
        Ok(ActivityRecord {
            id: parse_uuid(&row.id)?,
            actor_id: UserId(parse_uuid(&row.actor_id)?),
            group_id: row
                .group_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(GroupId),
            action: row.action,
            message: row.message,
            metadata,
            created_at: row.created_at,
        })
    }
}

// ──────────────────────────── Shared queries (pool or txn) ────────────────────────────

async fn fetch_user<'e>(exec: impl SqliteExecutor<'e>, id: &UserId) -> Result<User, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, UserRow>(&sql)
        .bind(id.0.to_string())
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

async fn fetch_group<'e>(exec: impl SqliteExecutor<'e>, id: &GroupId) -> Result<Group, StoreError> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM study_groups WHERE id = ?");
    sqlx::query_as::<_, GroupRow>(&sql)
        .bind(id.0.to_string())
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

async fn count_members<'e>(exec: impl SqliteExecutor<'e>, id: &GroupId) -> Result<u32, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM memberships WHERE group_id = ? AND status = 'ACTIVE'",
    )
    .bind(id.0.to_string())
    .fetch_one(exec)
    .await
    .map_err(StoreError::backend)?;
    u32::try_from(count).map_err(StoreError::backend)
}

async fn fetch_active_membership<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: &UserId,
) -> Result<Option<Membership>, StoreError> {
    let sql = format!(
        "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = ? AND status = 'ACTIVE'"
    );
    sqlx::query_as::<_, MembershipRow>(&sql)
        .bind(user_id.0.to_string())
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .map(Membership::try_from)
        .transpose()
}

async fn fetch_request<'e>(
    exec: impl SqliteExecutor<'e>,
    id: &RequestId,
) -> Result<MembershipRequest, StoreError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE id = ?");
    sqlx::query_as::<_, RequestRow>(&sql)
        .bind(id.0.to_string())
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

async fn fetch_notice<'e>(exec: impl SqliteExecutor<'e>, id: &NoticeId) -> Result<Notice, StoreError> {
    let sql = format!("SELECT {NOTICE_COLUMNS} FROM notices WHERE id = ?");
    sqlx::query_as::<_, NoticeRow>(&sql)
        .bind(id.0.to_string())
        .fetch_optional(exec)
        .await
        .map_err(StoreError::backend)?
        .ok_or(StoreError::NotFound)?
        .try_into()
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ───────────────────────────────────── Store ─────────────────────────────────────

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        fetch_user(&self.pool, user_id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    // ─────────────────────────── Whitelist ───────────────────────────

    async fn add_whitelisted_email(
        &self,
        email: &str,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO email_whitelist(email, note, created_at) VALUES(?, ?, ?)")
            .bind(email)
            .bind(note)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn remove_whitelisted_email(&self, email: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM email_whitelist WHERE email = ?")
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
        fetch_group(&self.pool, group_id).await
    }

    async fn list_groups(&self) -> Result<Vec<GroupSummary>, StoreError> {
        let rows = sqlx::query_as::<_, GroupSummaryRow>(
            "SELECT g.id, g.name, g.description, g.purpose, g.max_members, g.leader_id,
                    g.is_active, g.created_at, g.updated_at,
                    (SELECT COUNT(*) FROM memberships m
                      WHERE m.group_id = g.id AND m.status = 'ACTIVE') AS member_count
               FROM study_groups g
              WHERE g.is_active = 1
              ORDER BY g.id DESC",
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
              WHERE m.group_id = ? AND m.status = 'ACTIVE'
              ORDER BY m.id",
        )
        .bind(group_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(MemberProfile {
                    membership_id: MembershipId(parse_uuid(&row.membership_id)?),
                    user_id: UserId(parse_uuid(&row.user_id)?),
                    email: row.email,
                    name: row.name,
                    joined_at: row.joined_at,
                })
            })
            .collect()
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
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE group_id = "
        ));
        qb.push_bind(group_id.0.to_string());
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY id DESC");

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
            "SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE user_id = ? ORDER BY id DESC"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(user_id.0.to_string())
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
            "SELECT {NOTICE_COLUMNS} FROM notices WHERE group_id = ? ORDER BY pinned DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, NoticeRow>(&sql)
            .bind(group_id.0.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }
}

// ────────────────────────────────── Unit of work ─────────────────────────────────

pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait::async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn lock_group(&mut self, group_id: &GroupId) -> Result<Group, StoreError> {
        // A no-op write takes SQLite's RESERVED lock for the rest of the transaction.
        sqlx::query("UPDATE study_groups SET updated_at = updated_at WHERE id = ?")
            .bind(group_id.0.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        fetch_group(&mut *self.tx, group_id).await
    }

    async fn lock_user(&mut self, user_id: &UserId) -> Result<User, StoreError> {
        sqlx::query("UPDATE users SET updated_at = updated_at WHERE id = ?")
            .bind(user_id.0.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        fetch_user(&mut *self.tx, user_id).await
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn is_email_whitelisted(&mut self, email: &str) -> Result<bool, StoreError> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT email FROM email_whitelist WHERE email = ?")
                .bind(email)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(StoreError::backend)?;
        Ok(found.is_some())
    }

    async fn insert_user(&mut self, params: &CreateUserParams) -> Result<User, StoreError> {
        let id = UserId::new();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users(id, email, name, password_hash, verified, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.0.to_string())
        .bind(&params.email)
        .bind(&params.name)
        .bind(&params.password_hash)
        .bind(params.verified)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;
        fetch_user(&mut *self.tx, &id).await
    }

    async fn update_profile(
        &mut self,
        user_id: &UserId,
        params: &UpdateProfileParams,
    ) -> Result<User, StoreError> {
        let result = sqlx::query(
            "UPDATE users
                SET name = COALESCE(?, name),
                    bio = COALESCE(?, bio),
                    github_url = COALESCE(?, github_url),
                    blog_url = COALESCE(?, blog_url),
                    updated_at = ?
              WHERE id = ?",
        )
        .bind(params.name.as_deref())
        .bind(params.bio.as_deref())
        .bind(params.github_url.as_deref())
        .bind(params.blog_url.as_deref())
        .bind(Utc::now())
        .bind(user_id.0.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        fetch_user(&mut *self.tx, user_id).await
    }

    // ───────────────────────────── Groups ────────────────────────────

    async fn find_active_group_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<Group>, StoreError> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM study_groups WHERE name = ? AND is_active = 1");
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .map(Group::try_from)
            .transpose()
    }

    async fn find_group_led_by(&mut self, user_id: &UserId) -> Result<Option<Group>, StoreError> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM study_groups WHERE leader_id = ? AND is_active = 1"
        );
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(user_id.0.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?
            .map(Group::try_from)
            .transpose()
    }

    async fn insert_group(&mut self, params: &CreateGroupParams) -> Result<Group, StoreError> {
        let id = GroupId::new();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO study_groups(id, name, description, purpose, max_members, leader_id,
                                      is_active, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(id.0.to_string())
        .bind(&params.name)
        .bind(params.description.as_deref())
        .bind(params.purpose.as_str())
        .bind(i64::from(params.max_members))
        .bind(params.leader_id.0.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;
        fetch_group(&mut *self.tx, &id).await
    }

    async fn update_group(
        &mut self,
        group_id: &GroupId,
        params: &UpdateGroupParams,
    ) -> Result<Group, StoreError> {
        let result = sqlx::query(
            "UPDATE study_groups
                SET description = COALESCE(?, description),
                    purpose = COALESCE(?, purpose),
                    max_members = COALESCE(?, max_members),
                    updated_at = ?
              WHERE id = ?",
        )
        .bind(params.description.as_deref())
        .bind(params.purpose.map(|p| p.as_str()))
        .bind(params.max_members.map(i64::from))
        .bind(Utc::now())
        .bind(group_id.0.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        fetch_group(&mut *self.tx, group_id).await
    }

    async fn deactivate_group(&mut self, group_id: &GroupId) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE study_groups SET is_active = 0, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(group_id.0.to_string())
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
              WHERE group_id = ? AND status = 'ACTIVE' ORDER BY id"
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(group_id.0.to_string())
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
        let id = MembershipId::new();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO memberships(id, group_id, user_id, status, joined_at, updated_at)
             VALUES(?, ?, ?, 'ACTIVE', ?, ?)",
        )
        .bind(id.0.to_string())
        .bind(group_id.0.to_string())
        .bind(user_id.0.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;
        Ok(Membership {
            id,
            group_id: *group_id,
            user_id: *user_id,
            status: MembershipStatus::Active,
            joined_at: now,
            updated_at: now,
        })
    }

    async fn end_membership(
        &mut self,
        membership_id: &MembershipId,
        status: MembershipStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE memberships SET status = ?, updated_at = ? WHERE id = ? AND status = 'ACTIVE'",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(membership_id.0.to_string())
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
              WHERE group_id = ? AND user_id = ? AND status = 'PENDING'"
        );
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(group_id.0.to_string())
            .bind(user_id.0.to_string())
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
        let id = RequestId::new();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO membership_requests(id, group_id, user_id, status, message,
                                             created_at, updated_at, expires_at)
             VALUES(?, ?, ?, 'PENDING', ?, ?, ?, ?)",
        )
        .bind(id.0.to_string())
        .bind(params.group_id.0.to_string())
        .bind(params.user_id.0.to_string())
        .bind(&params.message)
        .bind(now)
        .bind(now)
        .bind(params.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;
        fetch_request(&mut *self.tx, &id).await
    }

    async fn decide_request(
        &mut self,
        request_id: &RequestId,
        status: RequestStatus,
        response_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE membership_requests
                SET status = ?, response_message = COALESCE(?, response_message), updated_at = ?
              WHERE id = ? AND status = 'PENDING'",
        )
        .bind(status.as_str())
        .bind(response_message)
        .bind(Utc::now())
        .bind(request_id.0.to_string())
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
              WHERE group_id = ? AND status = 'PENDING' ORDER BY id"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(group_id.0.to_string())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        collect(rows)
    }

    async fn list_stale_pending_requests(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        // Timestamps are stored as text; compare them as chrono values.
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE status = 'PENDING' ORDER BY id"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        let pending: Vec<MembershipRequest> = collect(rows)?;
        Ok(pending
            .into_iter()
            .filter(|r| r.is_expired_at(now))
            .collect())
    }

    // ───────────────────────────── Notices ───────────────────────────

    async fn get_notice(&mut self, notice_id: &NoticeId) -> Result<Notice, StoreError> {
        fetch_notice(&mut *self.tx, notice_id).await
    }

    async fn insert_notice(&mut self, params: &CreateNoticeParams) -> Result<Notice, StoreError> {
        let id = NoticeId::new();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO notices(id, group_id, author_id, kind, title, content, pinned,
                                 created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.0.to_string())
        .bind(params.group_id.0.to_string())
        .bind(params.author_id.0.to_string())
        .bind(params.kind.as_str())
        .bind(&params.title)
        .bind(&params.content)
        .bind(params.pinned)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(write_err)?;
        fetch_notice(&mut *self.tx, &id).await
    }

    async fn update_notice(
        &mut self,
        notice_id: &NoticeId,
        params: &UpdateNoticeParams,
    ) -> Result<Notice, StoreError> {
        let result = sqlx::query(
            "UPDATE notices
                SET kind = COALESCE(?, kind),
                    title = COALESCE(?, title),
                    content = COALESCE(?, content),
                    updated_at = ?
              WHERE id = ?",
        )
        .bind(params.kind.map(|k| k.as_str()))
        .bind(params.title.as_deref())
        .bind(params.content.as_deref())
        .bind(Utc::now())
        .bind(notice_id.0.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        fetch_notice(&mut *self.tx, notice_id).await
    }

    async fn set_notice_pinned(
        &mut self,
        notice_id: &NoticeId,
        pinned: bool,
    ) -> Result<Notice, StoreError> {
        let result = sqlx::query("UPDATE notices SET pinned = ?, updated_at = ? WHERE id = ?")
            .bind(pinned)
            .bind(Utc::now())
            .bind(notice_id.0.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        fetch_notice(&mut *self.tx, notice_id).await
    }

    async fn delete_notice(&mut self, notice_id: &NoticeId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM notices WHERE id = ?")
            .bind(notice_id.0.to_string())
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
        let metadata = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::backend)?;
        sqlx::query(
            "INSERT INTO activity_logs(id, actor_id, group_id, action, message, metadata, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.actor_id.0.to_string())
        .bind(record.group_id.map(|g| g.0.to_string()))
        .bind(&record.action)
        .bind(&record.message)
        .bind(metadata)
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

fn push_activity_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ActivityFilter) {
    if let Some(actor) = &filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor.0.to_string());
    }
    if let Some(group) = &filter.group_id {
        qb.push(" AND group_id = ").push_bind(group.0.to_string());
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

fn activity_entry(row: ActivityRow) -> Result<ActivityEntry, ActivityLogError> {
    let record = ActivityRecord::try_from(row)
        .map_err(|e| ActivityLogError::Database(e.to_string()))?;
    ActivityEntry::try_from(record)
}

#[async_trait::async_trait]
impl ActivityLog for SqliteStore {
    async fn query(&self, filter: ActivityFilter) -> Result<Vec<ActivityEntry>, ActivityLogError> {
        let limit = filter.effective_limit()?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_logs WHERE 1 = 1"
        ));
        push_activity_filter(&mut qb, &filter);
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.effective_offset()));

        let rows = qb
            .build_query_as::<ActivityRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ActivityLogError::Database(e.to_string()))?;
        rows.into_iter().map(activity_entry).collect()
    }

    async fn get(&self, id: ActivityId) -> Result<ActivityEntry, ActivityLogError> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activity_logs WHERE id = ?");
        let row = sqlx::query_as::<_, ActivityRow>(&sql)
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ActivityLogError::Database(e.to_string()))?
            .ok_or(ActivityLogError::NotFound(id))?;
        activity_entry(row)
    }

    async fn count(&self, filter: ActivityFilter) -> Result<u64, ActivityLogError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM activity_logs WHERE 1 = 1");
        push_activity_filter(&mut qb, &filter);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ActivityLogError::Database(e.to_string()))?;
        u64::try_from(count).map_err(|e| ActivityLogError::Database(e.to_string()))
    }
}
