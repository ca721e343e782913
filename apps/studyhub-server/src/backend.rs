use std::sync::Arc;

use studyhub_activity::{ActivityEntry, ActivityFilter, ActivityId, ActivityLog, ActivityLogError};
use studyhub_storage::*;
use studyhub_store_postgres::PostgresStore;
use studyhub_store_sqlite::SqliteStore;

/// StoreBackend abstracts over SQLite and PostgreSQL implementations
#[derive(Clone)]
pub enum StoreBackend {
    Sqlite(Arc<SqliteStore>),
    Postgres(Arc<PostgresStore>),
}

impl StoreBackend {
    /// Open the backend named by the URL scheme; anything not PostgreSQL is SQLite.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
            Ok(StoreBackend::Postgres(Arc::new(
                PostgresStore::open(database_url).await?,
            )))
        } else {
            Ok(StoreBackend::Sqlite(Arc::new(
                SqliteStore::open(database_url).await?,
            )))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite(_) => "sqlite",
            StoreBackend::Postgres(_) => "postgres",
        }
    }
}

#[async_trait::async_trait]
impl Store for StoreBackend {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.begin().await,
            StoreBackend::Postgres(s) => s.begin().await,
        }
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_user_by_id(user_id).await,
            StoreBackend::Postgres(s) => s.get_user_by_id(user_id).await,
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_user_by_email(email).await,
            StoreBackend::Postgres(s) => s.get_user_by_email(email).await,
        }
    }

    async fn add_whitelisted_email(
        &self,
        email: &str,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.add_whitelisted_email(email, note).await,
            StoreBackend::Postgres(s) => s.add_whitelisted_email(email, note).await,
        }
    }

    async fn remove_whitelisted_email(&self, email: &str) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.remove_whitelisted_email(email).await,
            StoreBackend::Postgres(s) => s.remove_whitelisted_email(email).await,
        }
    }

    async fn list_whitelisted_emails(&self) -> Result<Vec<WhitelistEntry>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_whitelisted_emails().await,
            StoreBackend::Postgres(s) => s.list_whitelisted_emails().await,
        }
    }

    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_group(group_id).await,
            StoreBackend::Postgres(s) => s.get_group(group_id).await,
        }
    }

    async fn list_groups(&self) -> Result<Vec<GroupSummary>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_groups().await,
            StoreBackend::Postgres(s) => s.list_groups().await,
        }
    }

    async fn count_active_members(&self, group_id: &GroupId) -> Result<u32, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.count_active_members(group_id).await,
            StoreBackend::Postgres(s) => s.count_active_members(group_id).await,
        }
    }

    async fn list_group_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<MemberProfile>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_group_members(group_id).await,
            StoreBackend::Postgres(s) => s.list_group_members(group_id).await,
        }
    }

    async fn get_active_membership(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_active_membership(user_id).await,
            StoreBackend::Postgres(s) => s.get_active_membership(user_id).await,
        }
    }

    async fn get_request(&self, request_id: &RequestId) -> Result<MembershipRequest, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_request(request_id).await,
            StoreBackend::Postgres(s) => s.get_request(request_id).await,
        }
    }

    async fn list_group_requests(
        &self,
        group_id: &GroupId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_group_requests(group_id, status).await,
            StoreBackend::Postgres(s) => s.list_group_requests(group_id, status).await,
        }
    }

    async fn list_user_requests(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MembershipRequest>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_user_requests(user_id).await,
            StoreBackend::Postgres(s) => s.list_user_requests(user_id).await,
        }
    }

    async fn get_notice(&self, notice_id: &NoticeId) -> Result<Notice, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_notice(notice_id).await,
            StoreBackend::Postgres(s) => s.get_notice(notice_id).await,
        }
    }

    async fn list_notices(&self, group_id: &GroupId) -> Result<Vec<Notice>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_notices(group_id).await,
            StoreBackend::Postgres(s) => s.list_notices(group_id).await,
        }
    }
}

#[async_trait::async_trait]
impl ActivityLog for StoreBackend {
    async fn query(&self, filter: ActivityFilter) -> Result<Vec<ActivityEntry>, ActivityLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.query(filter).await,
            StoreBackend::Postgres(s) => s.query(filter).await,
        }
    }

    async fn get(&self, id: ActivityId) -> Result<ActivityEntry, ActivityLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.get(id).await,
            StoreBackend::Postgres(s) => s.get(id).await,
        }
    }

    async fn count(&self, filter: ActivityFilter) -> Result<u64, ActivityLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.count(filter).await,
            StoreBackend::Postgres(s) => s.count(filter).await,
        }
    }
}

