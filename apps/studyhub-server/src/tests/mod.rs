//! Server unit and integration tests.
//!
//! Tests are organized into modules by feature area:
//! - `common` - Shared app builder and HTTP helpers
//! - `auth` - Registration, login and the bearer gate
//! - `groups` - Group lifecycle over HTTP
//! - `requests` - Join request workflow over HTTP
//! - `notices` - Notice board and activity feed
//! - `store_backend` - Storage backend abstraction tests

pub mod common;

mod auth;
mod requests;
mod store_backend;
