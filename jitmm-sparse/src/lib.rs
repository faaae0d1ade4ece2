//! Fixed-sparsity multiply handles.
//!
//! A [`FixedSparsityGemm`] computes `C += A * B` where `A` is a constant
//! `m x k` operand whose sparsity pattern — and values — are known at
//! creation time. Creation scans `A` into compressed-sparse-row form and
//! asks the backend for a kernel with the pattern baked into the generated
//! code; if the backend refuses (pattern too large, too dense, shape
//! unsupported), the handle silently degrades to an ordinary dense kernel
//! dispatched through the cache, retaining an owned aligned copy of `A`.
//!
//! Which path was taken is invisible at the call site: `execute` has the
//! same signature and the same results either way. Only the chunking
//! differs — the specialized kernel covers one vector width of the output
//! per invocation, the dense kernel covers all of `n` at once.

use std::sync::Arc;

use jitmm_backend::{
    AlignedBuf, BackendError, CodegenBackend, CompileOutcome, CompiledKernel, KernelElement,
};
use jitmm_descriptor::{CsrMatrix, DescriptorError, GemmDescriptor};
use jitmm_dispatch::{DispatchError, KernelCache, KernelRef};

/// Errors from creating or executing a fixed-sparsity handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SparseGemmError {
    #[error("output width {n} must be a positive multiple of the vector width {vlen}")]
    ChunkWidth { n: u32, vlen: u32 },
    #[error("fixed-sparsity multiply requires alpha == 1.0, got {0}")]
    UnsupportedAlpha(f64),
    #[error("fixed-sparsity multiply requires beta == 1.0, got {0}")]
    UnsupportedBeta(f64),
    #[error("operand {operand} holds {len} elements but the shape needs {needed}")]
    ShortOperand {
        operand: &'static str,
        needed: usize,
        len: usize,
    },
    #[error("no kernel available for this shape")]
    NoKernel,
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Convenience alias for `Result<T, SparseGemmError>`.
pub type Result<T> = std::result::Result<T, SparseGemmError>;

/// Which kernel family the handle ended up with.
///
/// Exactly one variant is ever active, which is what guarantees the
/// create-time invariant: a specialized kernel retains no operand copy,
/// and a dense fallback always does.
enum KernelPath<T: KernelElement> {
    /// Pattern and values are embedded in the generated code; nothing else
    /// to retain. The kernel is owned here, not by the cache — its
    /// identity depends on the pattern, which no descriptor key captures.
    Sparse { kernel: Arc<CompiledKernel> },
    /// Cache-dispatched dense kernel plus an owned, aligned, packed copy
    /// of the constant operand, independent of the caller's buffer.
    Dense {
        kernel: KernelRef,
        a_dense: AlignedBuf<T>,
    },
}

/// Handle for repeated `C += A * B` with a fixed `A`.
///
/// Created once, read-only afterwards; `B` and `C` may change between
/// [`execute`](Self::execute) calls but must keep the shape fixed at
/// creation.
pub struct FixedSparsityGemm<T: KernelElement> {
    m: u32,
    n: u32,
    k: u32,
    ldb: u32,
    ldc: u32,
    n_chunk: u32,
    path: KernelPath<T>,
}

fn operand_extent(rows: u32, cols: u32, ld: u32) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows as usize - 1) * ld as usize + cols as usize
    }
}

impl<T: KernelElement> FixedSparsityGemm<T> {
    /// Build a handle for `C += A * B` with `A: m x k` (leading dimension
    /// `lda`, row-major) fixed to the contents of `a_dense`,
    /// `B: k x n` (`ldb`) and `C: m x n` (`ldc`).
    ///
    /// Preconditions, checked before any compilation is attempted:
    /// `n` is a positive multiple of the backend's vector width for `T`,
    /// and `alpha == beta == 1.0` — the specialized kernel family
    /// hard-codes pure accumulate semantics.
    ///
    /// The CSR scan of `a_dense` is transient; it is released before this
    /// function returns on every branch.
    #[allow(clippy::too_many_arguments)]
    pub fn create<B: CodegenBackend>(
        cache: &KernelCache<B>,
        m: u32,
        n: u32,
        k: u32,
        lda: u32,
        ldb: u32,
        ldc: u32,
        alpha: f64,
        beta: f64,
        a_dense: &[T],
    ) -> Result<Self> {
        let vlen = cache.backend().vector_width(T::PRECISION);
        if n == 0 || n % vlen != 0 {
            return Err(SparseGemmError::ChunkWidth { n, vlen });
        }
        if alpha != 1.0 {
            return Err(SparseGemmError::UnsupportedAlpha(alpha));
        }
        if beta != 1.0 {
            return Err(SparseGemmError::UnsupportedBeta(beta));
        }

        let pattern = CsrMatrix::from_dense(a_dense, m, k, lda)?;
        // The specialized kernel covers one vector width of the output per
        // invocation; lda is 0 because the operand lives in the code.
        let sparse_desc = GemmDescriptor::new(
            m as i64,
            vlen as i64,
            k as i64,
            0,
            ldb as i64,
            ldc as i64,
            1.0,
            1.0,
        )?
        .with_precision(T::PRECISION);

        match cache.backend().compile_gemm_sparse(&sparse_desc, &pattern)? {
            CompileOutcome::Compiled(kernel) => {
                drop(pattern);
                if T::pattern_code(kernel.code()).is_none() {
                    return Err(DispatchError::KernelType.into());
                }
                Ok(FixedSparsityGemm {
                    m,
                    n,
                    k,
                    ldb,
                    ldc,
                    n_chunk: vlen,
                    path: KernelPath::Sparse { kernel },
                })
            }
            CompileOutcome::Refused(reason) => {
                log::debug!("sparse specialization refused ({reason}); using the dense path");
                drop(pattern);

                let dense_desc = GemmDescriptor::new(
                    m as i64, n as i64, k as i64, k as i64, ldb as i64, ldc as i64, 1.0, 1.0,
                )?
                .with_precision(T::PRECISION)
                .with_alignment(true, false);
                let kernel = cache
                    .dispatch_gemm(&dense_desc)?
                    .ok_or(SparseGemmError::NoKernel)?;
                if kernel.as_gemm::<T>().is_none() {
                    return Err(DispatchError::KernelType.into());
                }

                // Pack A to row stride k so the handle's lifetime is
                // independent of the caller's buffer.
                let mut packed = AlignedBuf::<T>::zeroed(m as usize * k as usize)?;
                let dst = packed.as_mut_slice();
                let (src_stride, row) = (lda as usize, k as usize);
                for i in 0..m as usize {
                    dst[i * row..(i + 1) * row]
                        .copy_from_slice(&a_dense[i * src_stride..i * src_stride + row]);
                }

                Ok(FixedSparsityGemm {
                    m,
                    n,
                    k,
                    ldb,
                    ldc,
                    n_chunk: n,
                    path: KernelPath::Dense {
                        kernel,
                        a_dense: packed,
                    },
                })
            }
        }
    }

    /// Accumulate `A * B` into `C`, walking the output width in chunks of
    /// [`n_chunk`](Self::n_chunk). The chunks tile `[0, n)` exactly once;
    /// `create` guaranteed divisibility up front.
    pub fn execute(&self, b: &[T], c: &mut [T]) -> Result<()> {
        let needed_b = operand_extent(self.k, self.n, self.ldb);
        if b.len() < needed_b {
            return Err(SparseGemmError::ShortOperand {
                operand: "B",
                needed: needed_b,
                len: b.len(),
            });
        }
        let needed_c = operand_extent(self.m, self.n, self.ldc);
        if c.len() < needed_c {
            return Err(SparseGemmError::ShortOperand {
                operand: "C",
                needed: needed_c,
                len: c.len(),
            });
        }

        let n = self.n as usize;
        let chunk = self.n_chunk as usize;
        match &self.path {
            KernelPath::Dense { kernel, a_dense } => {
                let gemm = kernel.as_gemm::<T>().ok_or(DispatchError::KernelType)?;
                for j in (0..n).step_by(chunk) {
                    // Extents validated above; the dense kernel reads the
                    // packed copy, never the caller's original A.
                    unsafe {
                        gemm.call(a_dense.as_ptr(), b.as_ptr().add(j), c.as_mut_ptr().add(j))
                    };
                }
            }
            KernelPath::Sparse { kernel } => {
                let pk = T::pattern_code(kernel.code()).ok_or(DispatchError::KernelType)?;
                for j in (0..n).step_by(chunk) {
                    // Operand order differs from the dense path: the
                    // generated kernel takes the dense operand first and
                    // carries A implicitly.
                    unsafe { pk.call(b.as_ptr().add(j), c.as_mut_ptr().add(j)) };
                }
            }
        }
        Ok(())
    }

    /// Tear the handle down, releasing whichever resource its path
    /// retains: the owned operand copy on the dense path (the cached
    /// kernel itself stays in the cache, keyed by its descriptor), or the
    /// generated kernel on the specialized path. Dropping the handle is
    /// equivalent; the explicit form exists for callers that want the
    /// teardown visible.
    pub fn destroy(self) {}

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn ldb(&self) -> u32 {
        self.ldb
    }

    pub fn ldc(&self) -> u32 {
        self.ldc
    }

    /// Output columns covered per kernel invocation: the vector width on
    /// the specialized path, all of `n` on the dense path.
    pub fn n_chunk(&self) -> u32 {
        self.n_chunk
    }

    /// Whether the pattern-embedded kernel is active (as opposed to the
    /// dense fallback).
    pub fn is_specialized(&self) -> bool {
        matches!(self.path, KernelPath::Sparse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitmm_backend::LoopBackend;

    #[test]
    fn test_chunk_width_precondition() {
        let cache = KernelCache::new(LoopBackend::new());
        let a = vec![1.0f64; 16 * 16];
        let err = FixedSparsityGemm::create(&cache, 16, 7, 16, 16, 7, 7, 1.0, 1.0, &a)
            .unwrap_err();
        assert_eq!(err, SparseGemmError::ChunkWidth { n: 7, vlen: 8 });
    }

    #[test]
    fn test_scaling_preconditions() {
        let cache = KernelCache::new(LoopBackend::new());
        let a = vec![1.0f64; 4];
        assert_eq!(
            FixedSparsityGemm::create(&cache, 2, 8, 2, 2, 8, 8, -1.0, 1.0, &a).unwrap_err(),
            SparseGemmError::UnsupportedAlpha(-1.0)
        );
        assert_eq!(
            FixedSparsityGemm::create(&cache, 2, 8, 2, 2, 8, 8, 1.0, 0.0, &a).unwrap_err(),
            SparseGemmError::UnsupportedBeta(0.0)
        );
    }

    #[test]
    fn test_short_constant_operand() {
        let cache = KernelCache::new(LoopBackend::new());
        let a = vec![1.0f64; 8];
        let err = FixedSparsityGemm::create(&cache, 4, 8, 4, 4, 8, 8, 1.0, 1.0, &a).unwrap_err();
        assert_eq!(
            err,
            SparseGemmError::Descriptor(DescriptorError::ShortOperand { needed: 16, len: 8 })
        );
    }

    #[test]
    fn test_execute_validates_extents() {
        let cache = KernelCache::new(LoopBackend::new());
        let a: Vec<f64> = (0..4).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }).collect();
        let handle =
            FixedSparsityGemm::create(&cache, 2, 8, 2, 2, 8, 8, 1.0, 1.0, &a).unwrap();
        let b = vec![0.0f64; 4];
        let mut c = vec![0.0f64; 16];
        assert_eq!(
            handle.execute(&b, &mut c).unwrap_err(),
            SparseGemmError::ShortOperand {
                operand: "B",
                needed: 16,
                len: 4,
            }
        );
        let b = vec![0.0f64; 16];
        let mut short_c = vec![0.0f64; 4];
        assert_eq!(
            handle.execute(&b, &mut short_c).unwrap_err(),
            SparseGemmError::ShortOperand {
                operand: "C",
                needed: 16,
                len: 4,
            }
        );
    }
}
