//! Code-generation backend boundary for the jitmm kernel generator.
//!
//! The [`CodegenBackend`] trait is the seam between shape dispatch and
//! instruction encoding: given a descriptor (plus, for the fixed-sparsity
//! variant, a CSR pattern), a backend either produces a [`CompiledKernel`]
//! or refuses. Refusal is an expected, non-exceptional outcome — upstream
//! callers handle it by falling back to a less specialized path — so it is
//! modeled as a value ([`CompileOutcome::Refused`]) rather than an error.
//!
//! The crate ships one backend, [`LoopBackend`], which assembles
//! shape-specialized closures instead of machine code. It exists so the
//! dispatch and specialization layers are exercisable on any target; a
//! native instruction encoder plugs in by implementing the same trait.

pub mod aligned;
pub mod kernel;
pub mod loops;
mod simd;

use std::fmt;
use std::sync::Arc;

pub use aligned::AlignedBuf;
pub use kernel::{CompiledKernel, CopyKernel, GemmKernel, KernelCode, PatternGemmKernel};
pub use loops::LoopBackend;

use jitmm_descriptor::{CsrMatrix, Element, GemmDescriptor, MatcopyDescriptor, Precision};

/// Instruction-set target a kernel was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetIsa {
    /// Portable code with no instruction-set assumptions.
    Generic,
    Avx2,
    Avx512,
}

/// Why a backend declined to generate a kernel.
///
/// A refusal always means "no specialized kernel for this exact input",
/// never a malfunction; the caller is expected to have a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefuseReason {
    /// Transposed operands are outside the backend's kernel family.
    Transpose,
    /// One of the shape dimensions is zero.
    EmptyShape,
    /// The sparsity pattern has no nonzero entries to embed.
    EmptyPattern,
    /// Embedding the pattern would exceed the instruction budget.
    PatternTooLarge { nnz: usize, budget: usize },
    /// The pattern is dense enough that a dense kernel wins.
    PatternTooDense { nnz: usize, cells: usize },
    /// The sparse kernel family hard-codes `alpha = 1, beta = 1`.
    ScalingMode,
}

impl fmt::Display for RefuseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefuseReason::Transpose => write!(f, "transposed operands not supported"),
            RefuseReason::EmptyShape => write!(f, "shape has a zero dimension"),
            RefuseReason::EmptyPattern => write!(f, "sparsity pattern is empty"),
            RefuseReason::PatternTooLarge { nnz, budget } => {
                write!(f, "{nnz} nonzeros exceed the embedding budget of {budget}")
            }
            RefuseReason::PatternTooDense { nnz, cells } => {
                write!(f, "pattern with {nnz}/{cells} nonzeros is too dense to specialize")
            }
            RefuseReason::ScalingMode => {
                write!(f, "sparse kernels require alpha = 1 and beta = 1")
            }
        }
    }
}

/// Result of one compilation attempt.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Compiled(Arc<CompiledKernel>),
    Refused(RefuseReason),
}

/// Failures of the backend machinery itself, as opposed to refusals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("kernel buffer allocation failed ({0} bytes)")]
    Allocation(usize),
    #[error("descriptor precision {descriptor:?} does not match the requested element type {requested:?}")]
    PrecisionMismatch {
        descriptor: Precision,
        requested: Precision,
    },
}

/// The compile service: descriptor in, executable kernel (or refusal) out.
///
/// Implementations must be referentially transparent — the same input
/// always yields a semantically equivalent kernel — and must report
/// refusal rather than panic for unsupported shapes. Target constants
/// (vector width per precision) are exposed here because the sparse
/// specializer's precondition checks depend on them.
pub trait CodegenBackend: Send + Sync {
    /// The instruction-set target kernels are generated for.
    fn isa(&self) -> TargetIsa;

    /// Preferred vector width, in elements, for the given precision.
    fn vector_width(&self, precision: Precision) -> u32;

    /// Generate a dense multiply kernel, called as `(a, b, c)`.
    fn compile_gemm(&self, desc: &GemmDescriptor) -> Result<CompileOutcome, BackendError>;

    /// Generate a multiply kernel with the constant operand's sparsity
    /// pattern and values baked into the code. The result is called as
    /// `(b, c)`; it is valid only for the exact pattern and values
    /// captured here.
    fn compile_gemm_sparse<T: KernelElement>(
        &self,
        desc: &GemmDescriptor,
        pattern: &CsrMatrix<T>,
    ) -> Result<CompileOutcome, BackendError>;

    /// Generate a copy (or zero-fill) kernel, called as `(src, dst)`.
    fn compile_matcopy(&self, desc: &MatcopyDescriptor) -> Result<CompileOutcome, BackendError>;
}

/// Element types the kernel code representation can carry.
///
/// Extends [`Element`] with the wrap/unwrap glue between typed kernel
/// wrappers and the type-erased [`KernelCode`], so generic code can build
/// and retrieve kernels without matching on precision by hand.
pub trait KernelElement: Element {
    fn wrap_gemm(kernel: GemmKernel<Self>) -> KernelCode;
    fn wrap_pattern(kernel: PatternGemmKernel<Self>) -> KernelCode;
    fn gemm_code(code: &KernelCode) -> Option<&GemmKernel<Self>>;
    fn pattern_code(code: &KernelCode) -> Option<&PatternGemmKernel<Self>>;
}

impl KernelElement for f32 {
    fn wrap_gemm(kernel: GemmKernel<f32>) -> KernelCode {
        KernelCode::GemmF32(kernel)
    }

    fn wrap_pattern(kernel: PatternGemmKernel<f32>) -> KernelCode {
        KernelCode::PatternGemmF32(kernel)
    }

    fn gemm_code(code: &KernelCode) -> Option<&GemmKernel<f32>> {
        match code {
            KernelCode::GemmF32(k) => Some(k),
            _ => None,
        }
    }

    fn pattern_code(code: &KernelCode) -> Option<&PatternGemmKernel<f32>> {
        match code {
            KernelCode::PatternGemmF32(k) => Some(k),
            _ => None,
        }
    }
}

impl KernelElement for f64 {
    fn wrap_gemm(kernel: GemmKernel<f64>) -> KernelCode {
        KernelCode::GemmF64(kernel)
    }

    fn wrap_pattern(kernel: PatternGemmKernel<f64>) -> KernelCode {
        KernelCode::PatternGemmF64(kernel)
    }

    fn gemm_code(code: &KernelCode) -> Option<&GemmKernel<f64>> {
        match code {
            KernelCode::GemmF64(k) => Some(k),
            _ => None,
        }
    }

    fn pattern_code(code: &KernelCode) -> Option<&PatternGemmKernel<f64>> {
        match code {
            KernelCode::PatternGemmF64(k) => Some(k),
            _ => None,
        }
    }
}
