//! Session management for the dashboard.
//!
//! `Session` keeps the backend's bearer token on disk between runs. Tokens
//! are considered expired 30 minutes after login.

pub mod session;

pub use session::{Session, SessionData};
