pub use super::albums::Entity as Albums;
pub use super::audit_log::Entity as AuditLog;
pub use super::content_items::Entity as ContentItems;
pub use super::photos::Entity as Photos;
pub use super::users::Entity as Users;
