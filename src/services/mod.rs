pub mod audit;
pub mod auth;
pub mod csrf;
pub mod image;
pub mod session;
pub mod upload;

pub use audit::{AuditContext, AuditService};
pub use auth::{AuthError, AuthService};
pub use csrf::{CsrfError, CsrfStore};
pub use image::ImageOptimizer;
pub use session::{SessionPolicy, SessionRecord};
pub use upload::{StoredFile, UploadError, UploadField, UploadService};
