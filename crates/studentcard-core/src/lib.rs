//! Core library for the student card viewer.
//!
//! The centre of this crate is the offline cache controller: it sits between
//! the card viewer and the network, answers every read-only request from a
//! versioned cache store or the network according to the request's route, and
//! cleans up the stores of previous versions when a new one activates.
//!
//! - `controller`: lifecycle, fetch interception, control messages
//! - `routes`: the ordered URL classification table and per-route policies
//! - `cache`: cache store trait with in-memory and on-disk implementations
//! - `registration`: active/waiting controllers as seen by a page
//! - `viewer`: loads a student's card and manifest through the registration
//! - `api`, `auth`: dashboard REST client and saved login session

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod controller;
pub mod http;
pub mod models;
pub mod network;
pub mod registration;
pub mod routes;
pub mod viewer;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{CacheController, ControlMessage, ControllerConfig, ControllerState};
pub use registration::Registration;
pub use viewer::{CardView, CardViewer};
