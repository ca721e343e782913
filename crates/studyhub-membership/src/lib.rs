//! Study group membership workflow.
//!
//! [`MembershipEngine`] enforces the group rules on top of any
//! [`studyhub_storage::Store`]:
//!
//! - a group never has more ACTIVE members than `max_members`
//! - a user holds at most one ACTIVE membership system-wide
//! - only the leader decides join requests, pins notices and manages members
//! - a join request is decided at most once and never after it expired
//!
//! Each state change and its activity entries commit in one unit of work.

mod engine;
mod error;
mod notices;
mod queries;
mod requests;
mod role;
pub mod validate;

pub use engine::{MembershipEngine, NewGroup, NewUser, GROUP_CLOSED_RESPONSE};
pub use error::{ErrorKind, MembershipError};
pub use notices::NewNotice;
pub use queries::Page;
pub use requests::Decision;
pub use role::{has_role, GroupRole};
