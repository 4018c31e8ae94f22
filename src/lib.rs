//! rentdesk - property rental management backend
//!
//! Listings, property visits with reschedule negotiation, leases and their
//! chat threads behind a bearer-token JSON API. All modules are public so
//! integration tests can drive them directly.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod reschedule;
pub mod serde_helpers;
pub mod session;
pub mod settings;
pub mod storage;
pub mod tokens;
pub mod uploads;
pub mod user_sync;
pub mod web;
