//! Group notice board types.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{GroupId, NoticeId, ParseEnumError, UserId};

/// Kind of notice posted to a group board
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    General,
    Schedule,
    Assignment,
    Resource,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::General => "GENERAL",
            NoticeKind::Schedule => "SCHEDULE",
            NoticeKind::Assignment => "ASSIGNMENT",
            NoticeKind::Resource => "RESOURCE",
        }
    }
}

impl FromStr for NoticeKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GENERAL" => Ok(NoticeKind::General),
            "SCHEDULE" => Ok(NoticeKind::Schedule),
            "ASSIGNMENT" => Ok(NoticeKind::Assignment),
            "RESOURCE" => Ok(NoticeKind::Resource),
            _ => Err(ParseEnumError::new("notice kind", s)),
        }
    }
}

/// Notice record
#[derive(Clone, Debug)]
pub struct Notice {
    pub id: NoticeId,
    pub group_id: GroupId,
    pub author_id: UserId,
    pub kind: NoticeKind,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a notice
#[derive(Clone, Debug)]
pub struct CreateNoticeParams {
    pub group_id: GroupId,
    pub author_id: UserId,
    pub kind: NoticeKind,
    pub title: String,
    pub content: String,
    pub pinned: bool,
}

/// Notice fields the author may change. `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct UpdateNoticeParams {
    pub kind: Option<NoticeKind>,
    pub title: Option<String>,
    pub content: Option<String>,
}
