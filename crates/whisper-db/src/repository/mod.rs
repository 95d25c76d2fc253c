//! Repositories — free async functions over `&PgPool`, one module per
//! durable entity.

pub mod attachments;
pub mod backups;
pub mod devices;
pub mod groups;
pub mod identities;
pub mod pending;
