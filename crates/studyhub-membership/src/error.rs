use studyhub_storage::StoreError;
use thiserror::Error;

/// Broad failure classes; the HTTP layer maps each to one status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    ValidationFailed,
    Internal,
}

#[derive(Debug, Error)]
pub enum MembershipError {
    // Not found
    #[error("user not found")]
    UserNotFound,
    #[error("group not found")]
    GroupNotFound,
    #[error("join request not found")]
    RequestNotFound,
    #[error("notice not found")]
    NoticeNotFound,

    // Conflicts
    #[error("you already belong to a study group")]
    AlreadyMember,
    #[error("you already lead a study group")]
    AlreadyLeader,
    #[error("a study group with this name already exists")]
    NameTaken,
    #[error("the study group is full")]
    GroupFull,
    #[error("you cannot request to join a group you lead")]
    SelfRequestToOwnGroup,
    #[error("you already have a pending request for this group")]
    DuplicatePendingRequest,
    #[error("the join request has already been processed")]
    RequestAlreadyProcessed,
    #[error("the join request has expired")]
    RequestExpired,
    #[error("the applicant already belongs to a study group")]
    ApplicantAlreadyMember,
    #[error("capacity cannot be lower than the current member count ({current})")]
    CapacityBelowMembership { current: u32 },
    #[error("the group leader cannot leave the group")]
    LeaderCannotLeave,
    #[error("the group leader cannot be removed")]
    CannotRemoveLeader,
    #[error("this email is already registered")]
    EmailTaken,

    // Forbidden
    #[error("only the group leader can do this")]
    NotLeader,
    #[error("you are not a member of this group")]
    NotAMember,
    #[error("only the author can change this notice")]
    NotAuthor,
    #[error("this email is not on the registration whitelist")]
    EmailNotWhitelisted,

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl MembershipError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        MembershipError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use MembershipError::*;
        match self {
            UserNotFound | GroupNotFound | RequestNotFound | NoticeNotFound => ErrorKind::NotFound,
            AlreadyMember
            | AlreadyLeader
            | NameTaken
            | GroupFull
            | SelfRequestToOwnGroup
            | DuplicatePendingRequest
            | RequestAlreadyProcessed
            | RequestExpired
            | ApplicantAlreadyMember
            | CapacityBelowMembership { .. }
            | LeaderCannotLeave
            | CannotRemoveLeader
            | EmailTaken => ErrorKind::Conflict,
            NotLeader | NotAMember | NotAuthor | EmailNotWhitelisted => ErrorKind::Forbidden,
            Invalid { .. } => ErrorKind::ValidationFailed,
            Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        use MembershipError::*;
        match self {
            UserNotFound => "USER_NOT_FOUND",
            GroupNotFound => "GROUP_NOT_FOUND",
            RequestNotFound => "REQUEST_NOT_FOUND",
            NoticeNotFound => "NOTICE_NOT_FOUND",
            AlreadyMember => "ALREADY_MEMBER",
            AlreadyLeader => "ALREADY_LEADER",
            NameTaken => "NAME_TAKEN",
            GroupFull => "GROUP_FULL",
            SelfRequestToOwnGroup => "SELF_REQUEST_TO_OWN_GROUP",
            DuplicatePendingRequest => "DUPLICATE_PENDING_REQUEST",
            RequestAlreadyProcessed => "REQUEST_ALREADY_PROCESSED",
            RequestExpired => "REQUEST_EXPIRED",
            ApplicantAlreadyMember => "APPLICANT_ALREADY_MEMBER",
            CapacityBelowMembership { .. } => "CAPACITY_BELOW_MEMBERSHIP",
            LeaderCannotLeave => "LEADER_CANNOT_LEAVE",
            CannotRemoveLeader => "CANNOT_REMOVE_LEADER",
            EmailTaken => "EMAIL_TAKEN",
            NotLeader => "NOT_LEADER",
            NotAMember => "NOT_A_MEMBER",
            NotAuthor => "NOT_AUTHOR",
            EmailNotWhitelisted => "EMAIL_NOT_WHITELISTED",
            Invalid { .. } => "VALIDATION_FAILED",
            Store(_) => "INTERNAL",
        }
    }
}

/// Map a store `NotFound` to a domain error, passing everything else through.
pub(crate) fn or_not_found(err: MembershipError) -> impl FnOnce(StoreError) -> MembershipError {
    move |e| match e {
        StoreError::NotFound => err,
        other => MembershipError::Store(other),
    }
}

/// Map a store `AlreadyExists` (a unique index firing) to a domain error.
pub(crate) fn or_exists(err: MembershipError) -> impl FnOnce(StoreError) -> MembershipError {
    move |e| match e {
        StoreError::AlreadyExists => err,
        other => MembershipError::Store(other),
    }
}

/// Map a store `Conflict` (a guarded update matched no row) to a domain error.
pub(crate) fn or_conflict(err: MembershipError) -> impl FnOnce(StoreError) -> MembershipError {
    move |e| match e {
        StoreError::Conflict => err,
        other => MembershipError::Store(other),
    }
}
