//! Shared persistence helpers for the registry and per-batch config.
//!
//! Both stores are plain files that may be touched by more than one
//! high-level operation at a time. Every mutation therefore goes through:
//! - an advisory lock file held for the whole read-modify-write cycle
//! - an atomic write (temp file in the same directory, then rename)

mod atomic;
mod lock;

pub use atomic::atomic_write;
pub use lock::{FileLock, LockError, DEFAULT_LOCK_TIMEOUT};
