//! Domain logic for the attendance notification pipeline.
//!
//! Everything in this crate is pure: no database, no network, no ambient
//! clock. Callers pass `now` and the academy timezone explicitly.

pub mod attendance;
pub mod channels;
pub mod delivery;
pub mod error;
pub mod phone;
pub mod quiet_hours;
pub mod roles;
pub mod template;
pub mod types;
