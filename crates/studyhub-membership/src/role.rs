use serde::Serialize;
use studyhub_storage::{Group, Membership, UserId};

/// What a user may do in one group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Leader,
    Member,
    None,
}

impl GroupRole {
    pub fn is_member(self) -> bool {
        !matches!(self, GroupRole::None)
    }
}

/// Resolve `user`'s role in `group` from the user's ACTIVE membership (anywhere).
///
/// The leader is recognised from the group row itself, so a missing leader
/// membership never demotes them.
pub fn has_role(user: &UserId, group: &Group, membership: Option<&Membership>) -> GroupRole {
    if group.leader_id == *user {
        return GroupRole::Leader;
    }
    match membership {
        Some(m) if m.group_id == group.id && m.user_id == *user => GroupRole::Member,
        _ => GroupRole::None,
    }
}
