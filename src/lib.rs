//! Runtime kernel generation and dispatch for small, fixed-shape matrix
//! multiply and matrix copy.
//!
//! Instead of calling a generic routine, callers describe the exact
//! operation — dimensions, leading dimensions, scaling mode, transpose and
//! alignment flags, prefetch strategy, precision — as an immutable
//! descriptor. The dispatch layer compiles a kernel specialized for that
//! exact shape (at most once per distinct descriptor), caches it, and
//! returns a callable reference. A fixed-sparsity front end additionally
//! bakes a constant operand's nonzero pattern into the generated code,
//! falling back to a dense kernel when specialization is not profitable.
//!
//! This crate is a facade over the workspace members:
//!
//! - [`jitmm_descriptor`] — descriptors, CSR payloads, scalar bounds;
//! - [`jitmm_backend`] — the code-generation seam and the portable loop
//!   backend;
//! - [`jitmm_dispatch`] — the descriptor-keyed kernel cache;
//! - [`jitmm_sparse`] — fixed-sparsity multiply handles.
//!
//! # Example
//!
//! ```
//! use jitmm::{FixedSparsityGemm, KernelCache, LoopBackend};
//!
//! // A is a 16 x 16 identity fixed at creation time.
//! let mut a = vec![0.0f64; 16 * 16];
//! for i in 0..16 {
//!     a[i * 16 + i] = 1.0;
//! }
//!
//! let cache = KernelCache::new(LoopBackend::new());
//! let handle = FixedSparsityGemm::create(
//!     &cache, 16, 8, 16, 16, 8, 16, 1.0, 1.0, &a,
//! ).unwrap();
//!
//! let b = vec![1.0f64; 16 * 8];
//! let mut c = vec![0.0f64; 16 * 16];
//! handle.execute(&b, &mut c).unwrap();
//! assert_eq!(c[0], 1.0);
//! handle.destroy();
//! ```

pub use jitmm_backend::{
    AlignedBuf, BackendError, CodegenBackend, CompileOutcome, CompiledKernel, CopyKernel,
    GemmKernel, KernelCode, KernelElement, LoopBackend, PatternGemmKernel, RefuseReason,
    TargetIsa,
};
pub use jitmm_descriptor::{
    Alpha, Beta, CsrMatrix, DescriptorError, Element, GemmDescriptor, MatcopyDescriptor,
    Precision, PrefetchStrategy,
};
pub use jitmm_dispatch::{matcopy_into, DispatchError, KernelCache, KernelRef, MatcopyError};
pub use jitmm_sparse::{FixedSparsityGemm, SparseGemmError};
