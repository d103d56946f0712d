//! The Peering Store: the authoritative catalog of BGP peerings, its
//! soft-delete lifecycle, and the append-only HMAC-signed audit trail
//! produced by every accepted mutation.

#![warn(missing_docs)]

pub mod audit;
pub mod store;

pub use audit::{AuditAction, AuditLog, AuditLogTable};
pub use store::{InMemoryPeeringStore, Paging, PeeringFilter, Storage};
