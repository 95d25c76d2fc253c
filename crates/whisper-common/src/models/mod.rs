//! Durable-entity models shared by the repositories and the services.

pub mod attachment;
pub mod backup;
pub mod device;
pub mod envelope;
pub mod group;
pub mod identity;

pub use attachment::{AccessGrant, AttachmentMeta, AttachmentStatus};
pub use backup::ContactBackup;
pub use device::Device;
pub use envelope::{EnvelopeKind, NewEnvelope, PendingEnvelope};
pub use group::{Group, GroupMember, GroupRole};
pub use identity::{Identity, IdentityStatus};
