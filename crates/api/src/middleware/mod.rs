//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- the acting user, academy and role from a Bearer token.
//! - [`rbac::RequireAdmin`] -- requires an owner, admin or super-admin role.
//! - [`rbac::RequireSuperAdmin`] -- requires the super-admin role.

pub mod auth;
pub mod rbac;
