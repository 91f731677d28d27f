//! Data models for the student card backend.
//!
//! - `card`: students, secure cards, QR verification results
//! - `dashboard`: statistics for the dashboard home
//! - `job`: card generation jobs and CSV imports
//! - `manifest`: the per-card web-app manifest
//! - `user`: dashboard accounts and login tokens

pub mod card;
pub mod dashboard;
pub mod job;
pub mod manifest;
pub mod user;

pub use card::{NewStudent, OfflineNotice, ProgramList, QrVerification, SecureCard, Student};
pub use dashboard::{DashboardStats, ProgramCount, StudentCounts};
pub use job::{GenerationJob, ImportJob};
pub use manifest::{ManifestIcon, WebManifest};
pub use user::{LoginResponse, User};
