//! Attendance notification pipeline.
//!
//! - [`gate`] decides whether an attendance mark warrants parent messages.
//! - [`fanout`] writes one queue entry per eligible contact.
//! - [`gateway`] talks to the AlimTalk provider.
//! - [`worker`] claims due entries, sends them and drives retries.
//! - [`operations`] holds the staff-facing manual send and resend paths.
//!
//! All persistence goes through the [`store::NotificationStore`] seam,
//! whose every tenant-owned method takes a
//! [`TenantId`](academy_core::types::TenantId).

pub mod config;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod gateway;
pub mod operations;
pub mod rate_limit;
pub mod store;
pub mod worker;

#[cfg(feature = "testing")]
pub mod testing;
