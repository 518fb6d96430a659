pub mod prelude;

pub mod albums;
pub mod audit_log;
pub mod content_items;
pub mod photos;
pub mod users;
