//! Data model for the jitmm kernel generator.
//!
//! A kernel request is fully described by an immutable descriptor value:
//! [`GemmDescriptor`] for the matrix-multiply family and
//! [`MatcopyDescriptor`] for the matrix-copy family. Descriptors are
//! value-comparable and hashable; two equal descriptors always request
//! semantically identical kernels, which is what makes them usable as
//! cache keys.
//!
//! The module also provides [`CsrMatrix`], the transient compressed-sparse-row
//! payload handed to the backend when a fixed sparsity pattern is baked into
//! generated code, and the [`Element`] trait bounding the scalar types
//! kernels operate on.

pub mod csr;
pub mod element;
pub mod gemm;
pub mod matcopy;

pub use csr::CsrMatrix;
pub use element::Element;
pub use gemm::{Alpha, Beta, GemmDescriptor, Precision, PrefetchStrategy};
pub use matcopy::MatcopyDescriptor;

/// Errors raised while constructing a descriptor or a compile-request payload.
///
/// All of these are caller errors detected before any compilation is
/// attempted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("alpha must be 1.0 or -1.0, got {0}")]
    UnsupportedAlpha(f64),
    #[error("beta must be 0.0 or 1.0, got {0}")]
    UnsupportedBeta(f64),
    #[error("element size must be 1, 2, 4, or 8 bytes, got {0}")]
    UnsupportedTypesize(u32),
    #[error("dimension {0} exceeds the supported descriptor range")]
    DimensionOverflow(i64),
    #[error("leading dimension {ld} is shorter than the row length {row}")]
    LeadingDim { ld: u32, row: u32 },
    #[error("operand holds {len} elements but the shape needs {needed}")]
    ShortOperand { needed: usize, len: usize },
}

/// Convenience alias for `Result<T, DescriptorError>`.
pub type Result<T> = std::result::Result<T, DescriptorError>;
