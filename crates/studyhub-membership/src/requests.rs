//! Join request lifecycle: PENDING → APPROVED | REJECTED | EXPIRED, exactly once.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use studyhub_activity::{record, ActivityAction, ActivityEntry};
use studyhub_storage::{
    CreateRequestParams, GroupId, MembershipRequest, RequestId, RequestStatus, Store, StoreError,
    UnitOfWork, UserId,
};

use crate::engine::{lock_active_group, role_in};
use crate::error::{or_conflict, or_exists, or_not_found};
use crate::role::{has_role, GroupRole};
use crate::validate::{self, bounded, optional};
use crate::{MembershipEngine, MembershipError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn status(self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }

    fn action(self) -> ActivityAction {
        match self {
            Decision::Approve => ActivityAction::JoinRequestApproved,
            Decision::Reject => ActivityAction::JoinRequestRejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

/// Mark a stale PENDING request EXPIRED and log it, inside the caller's unit of work.
///
/// Returns `false` when a concurrent sweep already expired the row; nothing is
/// written then.
async fn expire(
    uow: &mut dyn UnitOfWork,
    request: &MembershipRequest,
) -> Result<bool, MembershipError> {
    match uow
        .decide_request(&request.id, RequestStatus::Expired, None)
        .await
    {
        Ok(()) => {}
        Err(StoreError::Conflict) => {
            let current = uow.get_request(&request.id).await?;
            if current.status == RequestStatus::Expired {
                tracing::debug!(request_id = %request.id, "Join request already expired");
                return Ok(false);
            }
            return Err(MembershipError::RequestAlreadyProcessed);
        }
        Err(e) => return Err(e.into()),
    }
    let entry = ActivityEntry::builder(&request.user_id, ActivityAction::JoinRequestExpired)
        .group_id(Some(&request.group_id))
        .message("join request expired")
        .metadata(json!({
            "request_id": request.id.to_string(),
            "expires_at": request.expires_at,
        }))
        .build();
    record(uow, &entry).await?;
    Ok(true)
}

/// Report requests the way they are logically, not as last swept.
fn with_effective_status(
    mut requests: Vec<MembershipRequest>,
    now: DateTime<Utc>,
) -> Vec<MembershipRequest> {
    for r in &mut requests {
        r.status = r.effective_status(now);
    }
    requests
}

impl<S: Store> MembershipEngine<S> {
    /// Ask to join `group_id`. Pending requests do not count as membership.
    pub async fn send_join_request(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        message: &str,
    ) -> Result<MembershipRequest, MembershipError> {
        let message = bounded(
            "message",
            message,
            validate::REQUEST_MESSAGE_MIN,
            validate::REQUEST_MESSAGE_MAX,
        )?;
        let now = Utc::now();

        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        uow.lock_user(requester)
            .await
            .map_err(or_not_found(MembershipError::UserNotFound))?;

        match role_in(uow.as_mut(), requester, &group).await? {
            (GroupRole::Leader, _) => return Err(MembershipError::SelfRequestToOwnGroup),
            (_, Some(_)) => return Err(MembershipError::AlreadyMember),
            (_, None) => {}
        }

        let count = uow.count_active_members(group_id).await?;
        if count >= group.max_members {
            return Err(MembershipError::GroupFull);
        }

        if let Some(existing) = uow.find_pending_request(group_id, requester).await? {
            if !existing.is_expired_at(now) {
                return Err(MembershipError::DuplicatePendingRequest);
            }
            // Stale row: expire it so the new request can take its place.
            expire(uow.as_mut(), &existing).await?;
        }

        let request = uow
            .insert_request(&CreateRequestParams::new(
                *group_id, *requester, message, now,
            ))
            .await
            .map_err(or_exists(MembershipError::DuplicatePendingRequest))?;

        let entry = ActivityEntry::builder(requester, ActivityAction::JoinRequestSent)
            .group_id(Some(group_id))
            .message(format!("asked to join \"{}\"", group.name))
            .metadata(json!({
                "request_id": request.id.to_string(),
                "expires_at": request.expires_at,
            }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(
            group_id = %group_id,
            user_id = %requester,
            request_id = %request.id,
            "Join request sent"
        );
        Ok(request)
    }

    /// Leader decision on a pending request.
    ///
    /// Capacity and the applicant's one-active-group rule are re-checked under
    /// the group lock, so concurrent approvals cannot overshoot `max_members`.
    pub async fn respond_to_request(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        request_id: &RequestId,
        decision: Decision,
        response_message: Option<&str>,
    ) -> Result<MembershipRequest, MembershipError> {
        let response_message = optional(
            "response_message",
            response_message,
            validate::RESPONSE_MESSAGE_MAX,
        )?;
        let now = Utc::now();

        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        if has_role(requester, &group, None) != GroupRole::Leader {
            return Err(MembershipError::NotLeader);
        }

        let request = uow
            .get_request(request_id)
            .await
            .map_err(or_not_found(MembershipError::RequestNotFound))?;
        if request.group_id != *group_id {
            return Err(MembershipError::RequestNotFound);
        }
        match request.status {
            RequestStatus::Pending => {}
            RequestStatus::Expired => return Err(MembershipError::RequestExpired),
            RequestStatus::Approved | RequestStatus::Rejected => {
                return Err(MembershipError::RequestAlreadyProcessed)
            }
        }
        if request.is_expired_at(now) {
            // Keep the expiry even though the decision itself fails.
            expire(uow.as_mut(), &request).await?;
            uow.commit().await?;
            tracing::info!(request_id = %request_id, "Join request expired before decision");
            return Err(MembershipError::RequestExpired);
        }

        if decision == Decision::Approve {
            uow.lock_user(&request.user_id)
                .await
                .map_err(or_not_found(MembershipError::UserNotFound))?;
            if uow.find_active_membership(&request.user_id).await?.is_some() {
                return Err(MembershipError::ApplicantAlreadyMember);
            }
            let count = uow.count_active_members(group_id).await?;
            if count >= group.max_members {
                tracing::debug!(group_id = %group_id, count, "Approval refused: group full");
                return Err(MembershipError::GroupFull);
            }
        }

        uow.decide_request(request_id, decision.status(), response_message.as_deref())
            .await
            .map_err(or_conflict(MembershipError::RequestAlreadyProcessed))?;
        if decision == Decision::Approve {
            uow.insert_membership(group_id, &request.user_id)
                .await
                .map_err(or_exists(MembershipError::ApplicantAlreadyMember))?;
        }

        let metadata = json!({
            "request_id": request_id.to_string(),
            "applicant_id": request.user_id.to_string(),
            "decision": decision.as_str(),
        });
        let applicant_entry = ActivityEntry::builder(&request.user_id, decision.action())
            .group_id(Some(group_id))
            .message(format!(
                "join request to \"{}\" was {}",
                group.name,
                match decision {
                    Decision::Approve => "approved",
                    Decision::Reject => "rejected",
                }
            ))
            .metadata(metadata.clone())
            .build();
        let leader_entry = ActivityEntry::builder(requester, ActivityAction::JoinRequestReviewed)
            .group_id(Some(group_id))
            .message(format!("reviewed a join request ({})", decision.as_str()))
            .metadata(metadata)
            .build();
        record(uow.as_mut(), &applicant_entry).await?;
        record(uow.as_mut(), &leader_entry).await?;

        let decided = uow.get_request(request_id).await?;
        uow.commit().await?;

        tracing::info!(
            group_id = %group_id,
            request_id = %request_id,
            decision = decision.as_str(),
            "Join request decided"
        );
        Ok(decided)
    }

    /// Expire every PENDING request whose deadline is at or before `now`.
    pub async fn sweep_expired_requests(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MembershipRequest>, MembershipError> {
        let mut uow = self.begin().await?;
        let mut expired = Vec::new();
        for request in uow.list_stale_pending_requests(now).await? {
            if expire(uow.as_mut(), &request).await? {
                expired.push(request);
            }
        }
        uow.commit().await?;

        if !expired.is_empty() {
            tracing::info!(expired = expired.len(), "Swept expired join requests");
        }
        Ok(expired)
    }

    /// Requests sent to a group (leader only), newest first.
    pub async fn list_group_requests(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>, MembershipError> {
        let group = self.active_group(group_id).await?;
        if has_role(requester, &group, None) != GroupRole::Leader {
            return Err(MembershipError::NotLeader);
        }
        let now = Utc::now();
        // Stored PENDING rows may be logically expired; filter on the effective status.
        let stored_filter = match status {
            Some(RequestStatus::Expired) => None,
            other => other,
        };
        let requests = self.store().list_group_requests(group_id, stored_filter).await?;
        let requests = with_effective_status(requests, now);
        Ok(match status {
            Some(wanted) => requests.into_iter().filter(|r| r.status == wanted).collect(),
            None => requests,
        })
    }

    /// The requester's own requests, newest first.
    pub async fn list_my_requests(
        &self,
        requester: &UserId,
    ) -> Result<Vec<MembershipRequest>, MembershipError> {
        let requests = self.store().list_user_requests(requester).await?;
        Ok(with_effective_status(requests, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use studyhub_activity::{ActivityFilter, ActivityLog};
    use studyhub_storage::{CreateGroupParams, CreateUserParams, GroupPurpose};
    use studyhub_store_sqlite::SqliteStore;

    use super::*;

    async fn stale_fixture() -> (Arc<SqliteStore>, MembershipRequest) {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let mut uow = store.begin().await.unwrap();
        let mut users = Vec::new();
        for email in ["lead@example.com", "late@example.com"] {
            users.push(
                uow.insert_user(&CreateUserParams {
                    email: email.to_string(),
                    name: "tester".to_string(),
                    password_hash: "$argon2id$stub".to_string(),
                    verified: true,
                })
                .await
                .unwrap(),
            );
        }
        let group = uow
            .insert_group(&CreateGroupParams {
                name: "Sweepers".to_string(),
                description: None,
                purpose: GroupPurpose::Other,
                max_members: 4,
                leader_id: users[0].id,
            })
            .await
            .unwrap();
        let request = uow
            .insert_request(&CreateRequestParams::new(
                group.id,
                users[1].id,
                "an old join request".to_string(),
                Utc::now() - Duration::days(8),
            ))
            .await
            .unwrap();
        uow.commit().await.unwrap();
        (store, request)
    }

    #[tokio::test]
    async fn expire_tolerates_a_row_swept_meanwhile() {
        let (store, request) = stale_fixture().await;

        // another unit of work expires the row first
        let mut sweep = store.begin().await.unwrap();
        assert!(expire(sweep.as_mut(), &request).await.unwrap());
        sweep.commit().await.unwrap();

        // a caller still holding the PENDING snapshot
        let mut uow = store.begin().await.unwrap();
        assert!(!expire(uow.as_mut(), &request).await.unwrap());
        uow.commit().await.unwrap();

        let logged = store
            .count(ActivityFilter::new().action(ActivityAction::JoinRequestExpired))
            .await
            .unwrap();
        assert_eq!(logged, 1);
        assert_eq!(
            store.get_request(&request.id).await.unwrap().status,
            RequestStatus::Expired
        );
    }

    #[tokio::test]
    async fn expire_refuses_a_decided_row() {
        let (store, request) = stale_fixture().await;

        let mut uow = store.begin().await.unwrap();
        uow.decide_request(&request.id, RequestStatus::Rejected, None)
            .await
            .unwrap();
        let err = expire(uow.as_mut(), &request).await.unwrap_err();
        assert!(matches!(err, MembershipError::RequestAlreadyProcessed));
    }

    #[tokio::test]
    async fn resend_after_sweep_uses_a_fresh_request() {
        let (store, request) = stale_fixture().await;
        let engine = MembershipEngine::new(store.clone());

        let swept = engine.sweep_expired_requests(Utc::now()).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert!(engine
            .sweep_expired_requests(Utc::now())
            .await
            .unwrap()
            .is_empty());

        let fresh = engine
            .send_join_request(&request.user_id, &request.group_id, "trying once more, please")
            .await
            .unwrap();
        assert_ne!(fresh.id, request.id);
        assert_eq!(fresh.status, RequestStatus::Pending);
    }
}
