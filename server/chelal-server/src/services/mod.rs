pub mod audit;
pub mod notifications;

pub use audit::{AuditAction, AuditService};
pub use notifications::NotificationService;
