//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument and the owning [`TenantId`] as the
//! second.
//!
//! [`TenantId`]: academy_core::types::TenantId

pub mod attendance_repo;
pub mod audit_repo;
pub mod contact_repo;
pub mod notification_queue_repo;
pub mod settings_repo;
pub mod template_repo;

pub use attendance_repo::AttendanceRepo;
pub use audit_repo::AuditLogRepo;
pub use contact_repo::ParentContactRepo;
pub use notification_queue_repo::NotificationQueueRepo;
pub use settings_repo::NotificationSettingsRepo;
pub use template_repo::MessageTemplateRepo;
