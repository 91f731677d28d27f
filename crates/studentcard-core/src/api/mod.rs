//! REST API client for the student card backend.
//!
//! This module provides the `ApiClient` used by the dashboard side: login,
//! statistics, students, CSV imports, generation jobs, users and QR
//! verification. Card data for the viewer goes
//! through the cache controller instead (see `crate::viewer`).
//!
//! The API uses OAuth2 password-flow bearer tokens obtained from
//! `/api/v1/auth/login`.

pub mod client;
pub mod error;

pub use client::{endpoint_url, ApiClient, StudentFilter, API_PREFIX, STUDENT_CARDS_PATH};
pub use error::ApiError;
