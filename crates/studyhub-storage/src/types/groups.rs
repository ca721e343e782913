//! Study group types.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{GroupId, ParseEnumError, UserId};

/// Smallest capacity a group may be created with (leader + one member).
pub const MIN_GROUP_CAPACITY: u32 = 2;
/// Largest capacity a group may be created with.
pub const MAX_GROUP_CAPACITY: u32 = 10;

/// What a study group is for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupPurpose {
    Learning,
    Project,
    Discussion,
    Networking,
    Other,
}

impl GroupPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupPurpose::Learning => "LEARNING",
            GroupPurpose::Project => "PROJECT",
            GroupPurpose::Discussion => "DISCUSSION",
            GroupPurpose::Networking => "NETWORKING",
            GroupPurpose::Other => "OTHER",
        }
    }
}

impl FromStr for GroupPurpose {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEARNING" => Ok(GroupPurpose::Learning),
            "PROJECT" => Ok(GroupPurpose::Project),
            "DISCUSSION" => Ok(GroupPurpose::Discussion),
            "NETWORKING" => Ok(GroupPurpose::Networking),
            "OTHER" => Ok(GroupPurpose::Other),
            _ => Err(ParseEnumError::new("group purpose", s)),
        }
    }
}

/// Study group record
#[derive(Clone, Debug)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub purpose: GroupPurpose,
    pub max_members: u32,
    pub leader_id: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Group together with its live ACTIVE member count
#[derive(Clone, Debug)]
pub struct GroupSummary {
    pub group: Group,
    pub member_count: u32,
}

/// Parameters for creating a group
#[derive(Clone, Debug)]
pub struct CreateGroupParams {
    pub name: String,
    pub description: Option<String>,
    pub purpose: GroupPurpose,
    pub max_members: u32,
    pub leader_id: UserId,
}

/// Group fields the leader may change. `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct UpdateGroupParams {
    pub description: Option<String>,
    pub purpose: Option<GroupPurpose>,
    pub max_members: Option<u32>,
}
