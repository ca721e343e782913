//! Business-level bounds. The HTTP layer validates shapes first; these run
//! again in the core so every entry point gets the same rules.

use studyhub_storage::{MAX_GROUP_CAPACITY, MIN_GROUP_CAPACITY};

use crate::MembershipError;

pub const GROUP_NAME_MIN: usize = 2;
pub const GROUP_NAME_MAX: usize = 50;
pub const DESCRIPTION_MAX: usize = 500;
pub const REQUEST_MESSAGE_MIN: usize = 10;
pub const REQUEST_MESSAGE_MAX: usize = 500;
pub const RESPONSE_MESSAGE_MAX: usize = 500;
pub const NOTICE_TITLE_MAX: usize = 100;
pub const NOTICE_CONTENT_MAX: usize = 5000;
pub const USER_NAME_MAX: usize = 50;
pub const BIO_MAX: usize = 500;
pub const URL_MAX: usize = 200;

/// Trim `value` and check its length in characters.
pub(crate) fn bounded(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<String, MembershipError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        return Err(MembershipError::invalid(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    if len > max {
        return Err(MembershipError::invalid(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, MembershipError> {
    value.map(|v| bounded(field, v, 0, max)).transpose()
}

pub(crate) fn capacity(max_members: u32) -> Result<u32, MembershipError> {
    if !(MIN_GROUP_CAPACITY..=MAX_GROUP_CAPACITY).contains(&max_members) {
        return Err(MembershipError::invalid(
            "max_members",
            format!("must be between {MIN_GROUP_CAPACITY} and {MAX_GROUP_CAPACITY}"),
        ));
    }
    Ok(max_members)
}

pub(crate) fn url(field: &'static str, value: Option<&str>) -> Result<Option<String>, MembershipError> {
    let Some(v) = optional(field, value, URL_MAX)? else {
        return Ok(None);
    };
    if !v.is_empty() && !(v.starts_with("https://") || v.starts_with("http://")) {
        return Err(MembershipError::invalid(field, "must be an http(s) URL"));
    }
    Ok(Some(v))
}

/// Emails are compared case-insensitively and stored lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
