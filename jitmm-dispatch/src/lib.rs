//! Kernel cache and dispatch.
//!
//! [`KernelCache`] maps descriptors to compiled kernels, invoking the
//! code-generation backend at most once per distinct descriptor value and
//! serving every later request from the cache. It is an explicit context
//! object rather than a process-global: tests (and embedders that want
//! isolation) instantiate as many independent caches as they like.
//!
//! Dispatch has three outcomes, mirroring the backend contract:
//! `Ok(Some(kernel))` on success, `Ok(None)` when the backend refuses the
//! shape (the caller falls back to a less specialized path), and `Err` for
//! machinery failures.

pub mod cache;
pub mod matcopy;

pub use cache::{KernelCache, KernelRef};
pub use matcopy::{matcopy_into, MatcopyError};

use jitmm_backend::BackendError;

/// Failures of the dispatch machinery, as opposed to compile refusals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("cached kernel does not match the requested kernel family or element type")]
    KernelType,
}

/// Convenience alias for `Result<T, DispatchError>`.
pub type Result<T> = std::result::Result<T, DispatchError>;
