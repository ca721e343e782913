//! Membership and membership-request types.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use super::{GroupId, MembershipId, ParseEnumError, RequestId, UserId};

/// How long a join request stays answerable.
pub const REQUEST_TTL_DAYS: i64 = 7;

/// Lifecycle of a membership row. ACTIVE -> {REMOVED, LEFT} is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MembershipStatus {
    Active,
    Removed,
    Left,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "ACTIVE",
            MembershipStatus::Removed => "REMOVED",
            MembershipStatus::Left => "LEFT",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(MembershipStatus::Active),
            "REMOVED" => Ok(MembershipStatus::Removed),
            "LEFT" => Ok(MembershipStatus::Left),
            _ => Err(ParseEnumError::new("membership status", s)),
        }
    }
}

/// Membership record
#[derive(Clone, Debug)]
pub struct Membership {
    pub id: MembershipId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// ACTIVE member of a group joined with the user's public profile
#[derive(Clone, Debug)]
pub struct MemberProfile {
    pub membership_id: MembershipId,
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// Lifecycle of a join request. PENDING -> {APPROVED, REJECTED, EXPIRED} happens once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Expired => "EXPIRED",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            "EXPIRED" => Ok(RequestStatus::Expired),
            _ => Err(ParseEnumError::new("request status", s)),
        }
    }
}

/// Join request record
#[derive(Clone, Debug)]
pub struct MembershipRequest {
    pub id: RequestId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub status: RequestStatus,
    pub message: String,
    pub response_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MembershipRequest {
    /// A PENDING request past its expiry is logically EXPIRED even before it is swept.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RequestStatus::Expired => true,
            RequestStatus::Pending => now >= self.expires_at,
            RequestStatus::Approved | RequestStatus::Rejected => false,
        }
    }

    /// Status as a reader should see it at `now`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RequestStatus {
        if self.is_expired_at(now) {
            RequestStatus::Expired
        } else {
            self.status
        }
    }
}

/// Parameters for creating a join request
#[derive(Clone, Debug)]
pub struct CreateRequestParams {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

impl CreateRequestParams {
    /// Request created at `now` with the standard time-to-live.
    pub fn new(group_id: GroupId, user_id: UserId, message: String, now: DateTime<Utc>) -> Self {
        Self {
            group_id,
            user_id,
            message,
            expires_at: now + Duration::days(REQUEST_TTL_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_request(expires_at: DateTime<Utc>) -> MembershipRequest {
        let now = Utc::now();
        MembershipRequest {
            id: RequestId::new(),
            group_id: GroupId::new(),
            user_id: UserId::new(),
            status: RequestStatus::Pending,
            message: "please let me in".to_string(),
            response_message: None,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    #[test]
    fn test_request_ttl_is_seven_days() {
        let now = Utc::now();
        let params = CreateRequestParams::new(GroupId::new(), UserId::new(), "hi".into(), now);
        assert_eq!(params.expires_at - now, Duration::days(7));
    }

    #[test]
    fn test_pending_request_expires_lazily() {
        let now = Utc::now();
        let req = pending_request(now - Duration::seconds(1));
        assert_eq!(req.status, RequestStatus::Pending);
        assert!(req.is_expired_at(now));
        assert_eq!(req.effective_status(now), RequestStatus::Expired);

        let fresh = pending_request(now + Duration::days(1));
        assert!(!fresh.is_expired_at(now));
        assert_eq!(fresh.effective_status(now), RequestStatus::Pending);
    }

    #[test]
    fn test_decided_request_never_expires() {
        let now = Utc::now();
        let mut req = pending_request(now - Duration::days(30));
        req.status = RequestStatus::Approved;
        assert!(!req.is_expired_at(now));
        assert_eq!(req.effective_status(now), RequestStatus::Approved);
    }

    #[test]
    fn test_status_strings_roundtrip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        for status in [
            MembershipStatus::Active,
            MembershipStatus::Removed,
            MembershipStatus::Left,
        ] {
            assert_eq!(status.as_str().parse::<MembershipStatus>().unwrap(), status);
        }
        assert!("CANCELLED".parse::<RequestStatus>().is_err());
    }
}
