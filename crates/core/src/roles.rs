//! Well-known role name constants.
//!
//! These must match the `role` claim issued by the auth collaborator.

pub const ROLE_SUPER_ADMIN: &str = "super_admin";
pub const ROLE_OWNER: &str = "owner";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TEACHER: &str = "teacher";

/// Roles allowed to send ad hoc messages and manage the queue of their academy.
pub fn is_elevated(role: &str) -> bool {
    matches!(role, ROLE_SUPER_ADMIN | ROLE_OWNER | ROLE_ADMIN)
}
