//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` row struct and, where
//! the pipeline writes the table, a create DTO for inserts.

pub mod attendance;
pub mod audit;
pub mod contact;
pub mod queue;
pub mod settings;
pub mod template;
