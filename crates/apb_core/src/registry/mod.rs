//! Batch registry.
//!
//! The registry is the single persisted collection of [`Batch`] records.
//! It is an explicit handle (usually shared as `Arc<BatchRegistry>`), and
//! every mutation is one locked read-modify-write against the backing file,
//! so concurrent operations never silently overwrite each other.
//!
//! [`Batch`]: crate::models::Batch

mod errors;
mod store;

pub use errors::{RegistryError, RegistryResult};
pub use store::BatchRegistry;
