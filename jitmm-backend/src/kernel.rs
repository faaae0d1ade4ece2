//! Compiled kernel representation.
//!
//! A [`CompiledKernel`] is an opaque callable unit plus metadata. The
//! callable itself is one of three typed wrappers behind the type-erased
//! [`KernelCode`] tag, one per call convention:
//!
//! - [`GemmKernel`] — dense multiply, called as `(a, b, c)`;
//! - [`PatternGemmKernel`] — fixed-sparsity multiply with the constant
//!   operand embedded at compile time, called as `(b, c)`;
//! - [`CopyKernel`] — matrix copy or zero-fill, called as `(src, dst)`.
//!
//! The operand-order asymmetry between the dense and pattern variants
//! mirrors how each kernel family is generated and must not be
//! normalized away by callers.
//!
//! Kernels perform no bounds checking; every `call` is `unsafe` and the
//! caller guarantees that buffers cover the compiled shape. Ownership is
//! shared via `Arc`: the cache holds dispatched kernels, a fixed-sparsity
//! handle holds its pattern kernel, and callers only ever hold references.

use std::fmt;

use crate::TargetIsa;

type GemmFn<T> = Box<dyn Fn(*const T, *const T, *mut T) + Send + Sync>;
type PatternFn<T> = Box<dyn Fn(*const T, *mut T) + Send + Sync>;
type CopyFn = Box<dyn Fn(*const u8, *mut u8) + Send + Sync>;

/// Dense multiply kernel: `C = alpha * A * B + beta * C` for one fixed
/// shape and scaling mode.
pub struct GemmKernel<T> {
    code: GemmFn<T>,
}

impl<T> GemmKernel<T> {
    pub fn from_fn(f: impl Fn(*const T, *const T, *mut T) + Send + Sync + 'static) -> Self {
        GemmKernel { code: Box::new(f) }
    }

    /// Invoke the kernel.
    ///
    /// # Safety
    ///
    /// `a`, `b` and `c` must cover the compiled shape (`m x k`, `k x n`
    /// and `m x n` with the compiled leading dimensions); `c` must be
    /// valid for writes and must not alias `a` or `b`.
    #[inline]
    pub unsafe fn call(&self, a: *const T, b: *const T, c: *mut T) {
        (self.code)(a, b, c)
    }
}

/// Fixed-sparsity multiply kernel: `C += A_pattern * B` where the constant
/// operand's pattern and values were captured at compile time.
pub struct PatternGemmKernel<T> {
    code: PatternFn<T>,
}

impl<T> PatternGemmKernel<T> {
    pub fn from_fn(f: impl Fn(*const T, *mut T) + Send + Sync + 'static) -> Self {
        PatternGemmKernel { code: Box::new(f) }
    }

    /// Invoke the kernel. The dense operand comes first; the constant
    /// operand is implicit in the generated code.
    ///
    /// # Safety
    ///
    /// `b` must cover `k x n` and `c` must cover `m x n` with the compiled
    /// leading dimensions; `c` must be valid for writes and must not alias
    /// `b`.
    #[inline]
    pub unsafe fn call(&self, b: *const T, c: *mut T) {
        (self.code)(b, c)
    }
}

/// Copy or zero-fill kernel over raw bytes.
pub struct CopyKernel {
    code: CopyFn,
}

impl CopyKernel {
    pub fn from_fn(f: impl Fn(*const u8, *mut u8) + Send + Sync + 'static) -> Self {
        CopyKernel { code: Box::new(f) }
    }

    /// Invoke the kernel.
    ///
    /// # Safety
    ///
    /// `dst` must cover the compiled destination extent and be valid for
    /// writes. For copy kernels `src` must cover the source extent and
    /// must not overlap `dst`; zero-fill kernels never read `src`, which
    /// may then be null.
    #[inline]
    pub unsafe fn call(&self, src: *const u8, dst: *mut u8) {
        (self.code)(src, dst)
    }
}

/// Type-erased kernel code, tagged by family and precision.
pub enum KernelCode {
    GemmF32(GemmKernel<f32>),
    GemmF64(GemmKernel<f64>),
    PatternGemmF32(PatternGemmKernel<f32>),
    PatternGemmF64(PatternGemmKernel<f64>),
    Matcopy(CopyKernel),
}

impl KernelCode {
    pub fn kind(&self) -> &'static str {
        match self {
            KernelCode::GemmF32(_) => "gemm-f32",
            KernelCode::GemmF64(_) => "gemm-f64",
            KernelCode::PatternGemmF32(_) => "pattern-gemm-f32",
            KernelCode::PatternGemmF64(_) => "pattern-gemm-f64",
            KernelCode::Matcopy(_) => "matcopy",
        }
    }
}

/// An executable kernel plus the metadata the dispatch layer tracks.
pub struct CompiledKernel {
    code: KernelCode,
    isa: TargetIsa,
    flops_per_call: u64,
}

impl CompiledKernel {
    pub fn new(code: KernelCode, isa: TargetIsa, flops_per_call: u64) -> Self {
        CompiledKernel {
            code,
            isa,
            flops_per_call,
        }
    }

    pub fn code(&self) -> &KernelCode {
        &self.code
    }

    pub fn isa(&self) -> TargetIsa {
        self.isa
    }

    /// Floating-point operations one invocation performs (0 for copy
    /// kernels).
    pub fn flops_per_call(&self) -> u64 {
        self.flops_per_call
    }
}

impl fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("kind", &self.code.kind())
            .field("isa", &self.isa)
            .field("flops_per_call", &self.flops_per_call)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let k = CompiledKernel::new(
            KernelCode::Matcopy(CopyKernel::from_fn(|_, _| {})),
            TargetIsa::Generic,
            0,
        );
        assert_eq!(k.code().kind(), "matcopy");
        assert!(format!("{k:?}").contains("matcopy"));
    }

    #[test]
    fn test_gemm_kernel_round_trip() {
        let kernel = GemmKernel::<f64>::from_fn(|a, _b, c| unsafe {
            *c = *a * 2.0;
        });
        let a = 21.0f64;
        let b = 0.0f64;
        let mut c = 0.0f64;
        unsafe { kernel.call(&a, &b, &mut c) };
        assert_eq!(c, 42.0);
    }
}
