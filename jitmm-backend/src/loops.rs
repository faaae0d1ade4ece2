//! Portable loop backend.
//!
//! [`LoopBackend`] implements [`CodegenBackend`] by assembling
//! shape-specialized closures at runtime. The shape, leading dimensions
//! and scaling mode — and, for pattern kernels, the entire nonzero
//! structure and the captured values — are fixed when the closure is
//! built, so the returned kernel is branch-free over them, which is the
//! portable analog of emitting a specialized instruction sequence.
//!
//! Prefetch strategies and alignment flags are accepted and recorded in
//! the descriptor; a loop backend has no prefetch instructions to issue,
//! so they only affect the cache key.

use std::sync::Arc;

use jitmm_descriptor::{
    Alpha, Beta, CsrMatrix, Element, GemmDescriptor, MatcopyDescriptor, Precision,
};

use crate::kernel::{CompiledKernel, CopyKernel, GemmKernel, PatternGemmKernel};
use crate::{simd, BackendError, CompileOutcome, KernelElement, RefuseReason, TargetIsa};

/// Most nonzeros a pattern kernel may embed; a stand-in for the
/// instruction budget of register-blocked embedding.
pub const MAX_EMBED_NNZ: usize = 4096;

/// Patterns denser than this compile to worse code than the dense kernel
/// family, so they are refused.
pub const MAX_EMBED_DENSITY: f64 = 0.5;

/// Backend that "compiles" kernels as specialized closures.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopBackend;

impl LoopBackend {
    pub fn new() -> Self {
        LoopBackend
    }
}

#[inline]
unsafe fn gemm_loop<T: Element, const NEG: bool, const ACC: bool>(
    a: *const T,
    b: *const T,
    c: *mut T,
    m: usize,
    n: usize,
    k: usize,
    lda: usize,
    ldb: usize,
    ldc: usize,
) {
    for i in 0..m {
        let a_row = a.add(i * lda);
        let c_row = c.add(i * ldc);
        for j in 0..n {
            let mut acc = T::zero();
            for l in 0..k {
                acc = acc + *a_row.add(l) * *b.add(l * ldb + j);
            }
            if NEG {
                acc = -acc;
            }
            let dst = c_row.add(j);
            *dst = if ACC { *dst + acc } else { acc };
        }
    }
}

/// Build a dense multiply closure, specialized per scaling mode so the
/// generated loop carries no alpha/beta branches.
fn build_gemm<T: Element>(desc: &GemmDescriptor) -> GemmKernel<T> {
    let (m, n, k) = (desc.m() as usize, desc.n() as usize, desc.k() as usize);
    let (lda, ldb, ldc) = (desc.lda() as usize, desc.ldb() as usize, desc.ldc() as usize);
    let flops = desc.flops_per_call();
    match (desc.alpha(), desc.beta()) {
        (Alpha::One, Beta::One) => GemmKernel::from_fn(move |a, b, c| {
            simd::with_arch(flops, || unsafe {
                gemm_loop::<T, false, true>(a, b, c, m, n, k, lda, ldb, ldc)
            })
        }),
        (Alpha::One, Beta::Zero) => GemmKernel::from_fn(move |a, b, c| {
            simd::with_arch(flops, || unsafe {
                gemm_loop::<T, false, false>(a, b, c, m, n, k, lda, ldb, ldc)
            })
        }),
        (Alpha::NegOne, Beta::One) => GemmKernel::from_fn(move |a, b, c| {
            simd::with_arch(flops, || unsafe {
                gemm_loop::<T, true, true>(a, b, c, m, n, k, lda, ldb, ldc)
            })
        }),
        (Alpha::NegOne, Beta::Zero) => GemmKernel::from_fn(move |a, b, c| {
            simd::with_arch(flops, || unsafe {
                gemm_loop::<T, true, false>(a, b, c, m, n, k, lda, ldb, ldc)
            })
        }),
    }
}

/// Build a pattern kernel: one unrolled accumulate run per nonzero of the
/// captured structure. `C += value * B_row` over the chunk width `n`.
fn build_pattern_gemm<T: Element>(
    desc: &GemmDescriptor,
    pattern: &CsrMatrix<T>,
) -> PatternGemmKernel<T> {
    let rows = pattern.rows() as usize;
    let n = desc.n() as usize;
    let (ldb, ldc) = (desc.ldb() as usize, desc.ldc() as usize);
    let row_ptr: Vec<usize> = pattern.row_ptr().iter().map(|&p| p as usize).collect();
    let col_idx: Vec<usize> = pattern.col_idx().iter().map(|&j| j as usize).collect();
    let values: Vec<T> = pattern.values().to_vec();
    let flops = 2 * values.len() as u64 * n as u64;
    PatternGemmKernel::from_fn(move |b, c| {
        simd::with_arch(flops, || unsafe {
            for i in 0..rows {
                let c_row = c.add(i * ldc);
                for e in row_ptr[i]..row_ptr[i + 1] {
                    let v = values[e];
                    let b_row = b.add(col_idx[e] * ldb);
                    for j in 0..n {
                        *c_row.add(j) = *c_row.add(j) + v * *b_row.add(j);
                    }
                }
            }
        })
    })
}

fn build_matcopy(desc: &MatcopyDescriptor) -> CopyKernel {
    let rows = desc.n() as usize;
    let ts = desc.typesize() as usize;
    let row_bytes = desc.m() as usize * ts;
    let ldi_bytes = desc.ldi() as usize * ts;
    let ldo_bytes = desc.ldo() as usize * ts;
    if desc.zero_source() {
        CopyKernel::from_fn(move |_src, dst| unsafe {
            for i in 0..rows {
                std::ptr::write_bytes(dst.add(i * ldo_bytes), 0, row_bytes);
            }
        })
    } else {
        CopyKernel::from_fn(move |src, dst| unsafe {
            for i in 0..rows {
                std::ptr::copy_nonoverlapping(src.add(i * ldi_bytes), dst.add(i * ldo_bytes), row_bytes);
            }
        })
    }
}

impl super::CodegenBackend for LoopBackend {
    fn isa(&self) -> TargetIsa {
        TargetIsa::Generic
    }

    fn vector_width(&self, precision: Precision) -> u32 {
        // Reference 512-bit target.
        match precision {
            Precision::Single => 16,
            Precision::Double => 8,
        }
    }

    fn compile_gemm(&self, desc: &GemmDescriptor) -> Result<CompileOutcome, BackendError> {
        if desc.trans_a() || desc.trans_b() {
            return Ok(CompileOutcome::Refused(RefuseReason::Transpose));
        }
        if desc.m() == 0 || desc.n() == 0 || desc.k() == 0 {
            return Ok(CompileOutcome::Refused(RefuseReason::EmptyShape));
        }
        let code = match desc.precision() {
            Precision::Single => f32::wrap_gemm(build_gemm::<f32>(desc)),
            Precision::Double => f64::wrap_gemm(build_gemm::<f64>(desc)),
        };
        log::debug!(
            "generated {} kernel for {}x{}x{}",
            code.kind(),
            desc.m(),
            desc.n(),
            desc.k()
        );
        Ok(CompileOutcome::Compiled(Arc::new(CompiledKernel::new(
            code,
            self.isa(),
            desc.flops_per_call(),
        ))))
    }

    fn compile_gemm_sparse<T: KernelElement>(
        &self,
        desc: &GemmDescriptor,
        pattern: &CsrMatrix<T>,
    ) -> Result<CompileOutcome, BackendError> {
        if desc.precision() != T::PRECISION {
            return Err(BackendError::PrecisionMismatch {
                descriptor: desc.precision(),
                requested: T::PRECISION,
            });
        }
        if desc.trans_a() || desc.trans_b() {
            return Ok(CompileOutcome::Refused(RefuseReason::Transpose));
        }
        if desc.alpha() != Alpha::One || desc.beta() != Beta::One {
            return Ok(CompileOutcome::Refused(RefuseReason::ScalingMode));
        }
        if desc.m() == 0 || desc.n() == 0 || desc.k() == 0 {
            return Ok(CompileOutcome::Refused(RefuseReason::EmptyShape));
        }
        let nnz = pattern.nnz();
        if nnz == 0 {
            return Ok(CompileOutcome::Refused(RefuseReason::EmptyPattern));
        }
        if nnz > MAX_EMBED_NNZ {
            return Ok(CompileOutcome::Refused(RefuseReason::PatternTooLarge {
                nnz,
                budget: MAX_EMBED_NNZ,
            }));
        }
        if pattern.density() > MAX_EMBED_DENSITY {
            return Ok(CompileOutcome::Refused(RefuseReason::PatternTooDense {
                nnz,
                cells: pattern.rows() as usize * pattern.cols() as usize,
            }));
        }
        let kernel = build_pattern_gemm::<T>(desc, pattern);
        let flops = 2 * nnz as u64 * desc.n() as u64;
        log::debug!(
            "embedded {} nonzeros into a {}-row pattern kernel",
            nnz,
            pattern.rows()
        );
        Ok(CompileOutcome::Compiled(Arc::new(CompiledKernel::new(
            T::wrap_pattern(kernel),
            self.isa(),
            flops,
        ))))
    }

    fn compile_matcopy(&self, desc: &MatcopyDescriptor) -> Result<CompileOutcome, BackendError> {
        if desc.m() == 0 || desc.n() == 0 {
            return Ok(CompileOutcome::Refused(RefuseReason::EmptyShape));
        }
        Ok(CompileOutcome::Compiled(Arc::new(CompiledKernel::new(
            crate::KernelCode::Matcopy(build_matcopy(desc)),
            self.isa(),
            0,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodegenBackend;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn compile(desc: &GemmDescriptor) -> Arc<CompiledKernel> {
        match LoopBackend::new().compile_gemm(desc).unwrap() {
            CompileOutcome::Compiled(k) => k,
            CompileOutcome::Refused(r) => panic!("unexpected refusal: {r}"),
        }
    }

    /// Reference triple loop over row-major operands.
    fn reference_gemm(
        a: &[f64],
        b: &[f64],
        c: &mut [f64],
        m: usize,
        n: usize,
        k: usize,
        lda: usize,
        ldb: usize,
        ldc: usize,
        alpha: f64,
        beta: f64,
    ) {
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0;
                for l in 0..k {
                    acc += a[i * lda + l] * b[l * ldb + j];
                }
                c[i * ldc + j] = alpha * acc + beta * c[i * ldc + j];
            }
        }
    }

    fn random_matrix(rng: &mut StdRng, len: usize) -> Vec<f64> {
        (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_gemm_matches_reference_all_modes() {
        let mut rng = StdRng::seed_from_u64(7);
        let (m, n, k) = (5usize, 6usize, 4usize);
        let (lda, ldb, ldc) = (k + 1, n + 2, n + 1);
        let a = random_matrix(&mut rng, m * lda);
        let b = random_matrix(&mut rng, k * ldb);
        let c0 = random_matrix(&mut rng, m * ldc);

        for (alpha, beta) in [(1.0, 1.0), (1.0, 0.0), (-1.0, 1.0), (-1.0, 0.0)] {
            let desc = GemmDescriptor::new(
                m as i64, n as i64, k as i64, lda as i64, ldb as i64, ldc as i64, alpha, beta,
            )
            .unwrap();
            let kernel = compile(&desc);
            let gemm = f64::gemm_code(kernel.code()).unwrap();

            let mut c = c0.clone();
            unsafe { gemm.call(a.as_ptr(), b.as_ptr(), c.as_mut_ptr()) };

            let mut expected = c0.clone();
            reference_gemm(&a, &b, &mut expected, m, n, k, lda, ldb, ldc, alpha, beta);
            for (&got, &want) in c.iter().zip(expected.iter()) {
                assert_relative_eq!(got, want, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_gemm_f32() {
        let desc = GemmDescriptor::new(2, 2, 2, 2, 2, 2, 1.0, 0.0)
            .unwrap()
            .with_precision(Precision::Single);
        let kernel = compile(&desc);
        let gemm = f32::gemm_code(kernel.code()).unwrap();
        let a: [f32; 4] = [1.0, 2.0, 3.0, 4.0];
        let b: [f32; 4] = [5.0, 6.0, 7.0, 8.0];
        let mut c = [0.0f32; 4];
        unsafe { gemm.call(a.as_ptr(), b.as_ptr(), c.as_mut_ptr()) };
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_gemm_precision_tag_selects_code() {
        let desc = GemmDescriptor::new(2, 2, 2, 2, 2, 2, 1.0, 0.0).unwrap();
        let kernel = compile(&desc);
        assert!(f64::gemm_code(kernel.code()).is_some());
        assert!(f32::gemm_code(kernel.code()).is_none());
    }

    #[test]
    fn test_gemm_refusals() {
        let backend = LoopBackend::new();
        let transposed = GemmDescriptor::new(4, 4, 4, 4, 4, 4, 1.0, 1.0)
            .unwrap()
            .with_transpose(true, false);
        assert!(matches!(
            backend.compile_gemm(&transposed).unwrap(),
            CompileOutcome::Refused(RefuseReason::Transpose)
        ));
        let empty = GemmDescriptor::new(0, 4, 4, 4, 4, 4, 1.0, 1.0).unwrap();
        assert!(matches!(
            backend.compile_gemm(&empty).unwrap(),
            CompileOutcome::Refused(RefuseReason::EmptyShape)
        ));
    }

    #[test]
    fn test_pattern_kernel_accumulates() {
        // A = [[2, 0], [0, 3]] embedded; B is 2 x 4, chunk width 4.
        let a = [2.0f64, 0.0, 0.0, 3.0];
        let pattern = CsrMatrix::from_dense(&a, 2, 2, 2).unwrap();
        let desc = GemmDescriptor::new(2, 4, 2, 0, 4, 4, 1.0, 1.0).unwrap();
        let outcome = LoopBackend::new()
            .compile_gemm_sparse(&desc, &pattern)
            .unwrap();
        let kernel = match outcome {
            CompileOutcome::Compiled(k) => k,
            CompileOutcome::Refused(r) => panic!("unexpected refusal: {r}"),
        };
        let pk = f64::pattern_code(kernel.code()).unwrap();

        let b: Vec<f64> = (0..8).map(|v| v as f64).collect();
        let mut c = vec![1.0f64; 8];
        unsafe { pk.call(b.as_ptr(), c.as_mut_ptr()) };
        // Row 0: 1 + 2 * b[0..4]; row 1: 1 + 3 * b[4..8].
        assert_eq!(c, vec![1.0, 3.0, 5.0, 7.0, 13.0, 16.0, 19.0, 22.0]);
    }

    #[test]
    fn test_sparse_refusal_policy() {
        let backend = LoopBackend::new();
        let desc = GemmDescriptor::new(2, 8, 2, 0, 8, 8, 1.0, 1.0).unwrap();

        let empty = CsrMatrix::<f64>::from_dense(&[0.0; 4], 2, 2, 2).unwrap();
        assert!(matches!(
            backend.compile_gemm_sparse(&desc, &empty).unwrap(),
            CompileOutcome::Refused(RefuseReason::EmptyPattern)
        ));

        let dense = CsrMatrix::<f64>::from_dense(&[1.0; 4], 2, 2, 2).unwrap();
        assert!(matches!(
            backend.compile_gemm_sparse(&desc, &dense).unwrap(),
            CompileOutcome::Refused(RefuseReason::PatternTooDense { nnz: 4, cells: 4 })
        ));

        let scaled = GemmDescriptor::new(2, 8, 2, 0, 8, 8, 1.0, 0.0).unwrap();
        let diag = CsrMatrix::<f64>::from_dense(&[1.0, 0.0, 0.0, 1.0], 2, 2, 2).unwrap();
        assert!(matches!(
            backend.compile_gemm_sparse(&scaled, &diag).unwrap(),
            CompileOutcome::Refused(RefuseReason::ScalingMode)
        ));
    }

    #[test]
    fn test_sparse_precision_mismatch_is_an_error() {
        let backend = LoopBackend::new();
        let desc = GemmDescriptor::new(2, 8, 2, 0, 8, 8, 1.0, 1.0)
            .unwrap()
            .with_precision(Precision::Single);
        let diag = CsrMatrix::<f64>::from_dense(&[1.0, 0.0, 0.0, 1.0], 2, 2, 2).unwrap();
        assert_eq!(
            backend.compile_gemm_sparse(&desc, &diag).unwrap_err(),
            BackendError::PrecisionMismatch {
                descriptor: Precision::Single,
                requested: Precision::Double,
            }
        );
    }

    #[test]
    fn test_matcopy_kernel_copies_rows() {
        let desc = MatcopyDescriptor::new(8, 3, 2, 4, 5).unwrap();
        let outcome = LoopBackend::new().compile_matcopy(&desc).unwrap();
        let kernel = match outcome {
            CompileOutcome::Compiled(k) => k,
            CompileOutcome::Refused(r) => panic!("unexpected refusal: {r}"),
        };
        let copy = match kernel.code() {
            crate::KernelCode::Matcopy(k) => k,
            _ => panic!("wrong kernel family"),
        };

        let src: Vec<f64> = (0..8).map(|v| v as f64).collect(); // 2 rows, ldi 4
        let mut dst = vec![-1.0f64; 10]; // 2 rows, ldo 5
        unsafe { copy.call(src.as_ptr().cast(), dst.as_mut_ptr().cast()) };
        assert_eq!(dst, vec![0.0, 1.0, 2.0, -1.0, -1.0, 4.0, 5.0, 6.0, -1.0, -1.0]);
    }

    #[test]
    fn test_matcopy_zero_fill_ignores_source() {
        let desc = MatcopyDescriptor::new(4, 2, 2, 2, 3)
            .unwrap()
            .with_zero_source(true);
        let outcome = LoopBackend::new().compile_matcopy(&desc).unwrap();
        let kernel = match outcome {
            CompileOutcome::Compiled(k) => k,
            CompileOutcome::Refused(r) => panic!("unexpected refusal: {r}"),
        };
        let copy = match kernel.code() {
            crate::KernelCode::Matcopy(k) => k,
            _ => panic!("wrong kernel family"),
        };

        let mut dst = vec![7i32; 6]; // 2 rows, ldo 3
        unsafe { copy.call(std::ptr::null(), dst.as_mut_ptr().cast()) };
        assert_eq!(dst, vec![0, 0, 7, 0, 0, 7]);
    }

    #[test]
    fn test_vector_widths() {
        let backend = LoopBackend::new();
        assert_eq!(backend.vector_width(Precision::Double), 8);
        assert_eq!(backend.vector_width(Precision::Single), 16);
    }
}
