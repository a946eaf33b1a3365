//! Middleware layer.
//!
//! Cross-cutting steps that run around dispatch, never inside it:
//!
//! - [`auth`]: turns request credentials into a [`Principal`](crate::Principal)
//!   and enforces a route's authorization requirement (401 / 403).
//! - [`trace`]: one span per request with method, path, status and latency.

pub mod auth;
pub mod trace;
