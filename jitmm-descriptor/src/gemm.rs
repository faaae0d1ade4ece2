//! Matrix-multiply kernel descriptors.
//!
//! A [`GemmDescriptor`] pins down every degree of freedom a generated
//! multiply kernel has: the shape `m x n x k`, the leading dimensions of the
//! three operands, the accumulate/overwrite mode, transpose and alignment
//! flags, the prefetch strategy, and the numeric precision. It carries no
//! behavior; it is pure data used as the cache key and as the compile
//! request payload.
//!
//! All matrices are row-major: element `(i, j)` of an operand with leading
//! dimension `ld` lives at offset `i * ld + j`.

use crate::{DescriptorError, Element, Result};

/// Numeric precision of a generated kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Single,
    Double,
}

/// Which operands the generated kernel issues cache prefetches for, and how
/// far ahead.
///
/// `AAhead*` variants prefetch the next block of A; `*BViaC` variants
/// additionally stream B through the C write path; `SignalOnly` emits the
/// prefetch signature without any prefetch instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrefetchStrategy {
    #[default]
    None,
    SignalOnly,
    BViaC,
    AAhead,
    AAheadCurrent,
    AAheadJumpPersist,
    AAheadBViaC,
    AAheadCurrentBViaC,
    AAheadJumpPersistBViaC,
}

/// The multiplicative scalar applied to `A * B`.
///
/// Kernels are only specialized for the two algebraically distinct signs;
/// arbitrary scalar multiply is out of contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alpha {
    One,
    NegOne,
}

impl Alpha {
    /// Validate a raw scalar; anything outside `{-1.0, 1.0}` is a caller
    /// error surfaced before compilation.
    pub fn from_f64(value: f64) -> Result<Self> {
        if value == 1.0 {
            Ok(Alpha::One)
        } else if value == -1.0 {
            Ok(Alpha::NegOne)
        } else {
            Err(DescriptorError::UnsupportedAlpha(value))
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Alpha::One => 1.0,
            Alpha::NegOne => -1.0,
        }
    }

    /// Apply the sign to an accumulated product.
    #[inline(always)]
    pub fn apply<T: Element>(self, value: T) -> T {
        match self {
            Alpha::One => value,
            Alpha::NegOne => -value,
        }
    }
}

/// Whether the kernel accumulates into C or overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Beta {
    Zero,
    One,
}

impl Beta {
    /// Validate a raw scalar; anything outside `{0.0, 1.0}` is a caller
    /// error surfaced before compilation.
    pub fn from_f64(value: f64) -> Result<Self> {
        if value == 0.0 {
            Ok(Beta::Zero)
        } else if value == 1.0 {
            Ok(Beta::One)
        } else {
            Err(DescriptorError::UnsupportedBeta(value))
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Beta::Zero => 0.0,
            Beta::One => 1.0,
        }
    }
}

/// Immutable, value-comparable description of one multiply kernel.
///
/// Equality and hashing cover every field, so a `GemmDescriptor` can serve
/// directly as a cache key: descriptors that compare equal request
/// semantically identical kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmDescriptor {
    m: u32,
    n: u32,
    k: u32,
    lda: u32,
    ldb: u32,
    ldc: u32,
    alpha: Alpha,
    beta: Beta,
    trans_a: bool,
    trans_b: bool,
    aligned_a: bool,
    aligned_c: bool,
    prefetch: PrefetchStrategy,
    precision: Precision,
}

fn clamp_dim(value: i64) -> Result<u32> {
    if value > u32::MAX as i64 {
        return Err(DescriptorError::DimensionOverflow(value));
    }
    Ok(value.max(0) as u32)
}

impl GemmDescriptor {
    /// Build a normalized descriptor for `C = alpha * A * B + beta * C`
    /// with `A: m x k` (leading dimension `lda`), `B: k x n` (`ldb`) and
    /// `C: m x n` (`ldc`).
    ///
    /// Negative dimensions are clamped to zero rather than rejected.
    /// `alpha` outside `{-1, 1}` and `beta` outside `{0, 1}` are caller
    /// errors. Transpose and alignment flags default to `false`, prefetch
    /// to [`PrefetchStrategy::None`] and precision to
    /// [`Precision::Double`]; use the `with_*` methods to set them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        m: i64,
        n: i64,
        k: i64,
        lda: i64,
        ldb: i64,
        ldc: i64,
        alpha: f64,
        beta: f64,
    ) -> Result<Self> {
        Ok(GemmDescriptor {
            m: clamp_dim(m)?,
            n: clamp_dim(n)?,
            k: clamp_dim(k)?,
            lda: clamp_dim(lda)?,
            ldb: clamp_dim(ldb)?,
            ldc: clamp_dim(ldc)?,
            alpha: Alpha::from_f64(alpha)?,
            beta: Beta::from_f64(beta)?,
            trans_a: false,
            trans_b: false,
            aligned_a: false,
            aligned_c: false,
            prefetch: PrefetchStrategy::None,
            precision: Precision::Double,
        })
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchStrategy) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_transpose(mut self, trans_a: bool, trans_b: bool) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    /// Mark operand buffers as guaranteed aligned to the backend's preferred
    /// boundary, which may unlock faster instruction variants.
    pub fn with_alignment(mut self, aligned_a: bool, aligned_c: bool) -> Self {
        self.aligned_a = aligned_a;
        self.aligned_c = aligned_c;
        self
    }

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn lda(&self) -> u32 {
        self.lda
    }

    pub fn ldb(&self) -> u32 {
        self.ldb
    }

    pub fn ldc(&self) -> u32 {
        self.ldc
    }

    pub fn alpha(&self) -> Alpha {
        self.alpha
    }

    pub fn beta(&self) -> Beta {
        self.beta
    }

    pub fn trans_a(&self) -> bool {
        self.trans_a
    }

    pub fn trans_b(&self) -> bool {
        self.trans_b
    }

    pub fn aligned_a(&self) -> bool {
        self.aligned_a
    }

    pub fn aligned_c(&self) -> bool {
        self.aligned_c
    }

    pub fn prefetch(&self) -> PrefetchStrategy {
        self.prefetch
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Floating-point operations one kernel invocation performs.
    pub fn flops_per_call(&self) -> u64 {
        2 * self.m as u64 * self.n as u64 * self.k as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> GemmDescriptor {
        GemmDescriptor::new(16, 8, 16, 16, 8, 16, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_negative_dims_clamp_to_zero() {
        let d = GemmDescriptor::new(-3, 8, -1, 16, 8, 16, 1.0, 0.0).unwrap();
        assert_eq!(d.m(), 0);
        assert_eq!(d.n(), 8);
        assert_eq!(d.k(), 0);
    }

    #[test]
    fn test_dimension_overflow_rejected() {
        let err = GemmDescriptor::new(1 << 40, 8, 16, 16, 8, 16, 1.0, 1.0).unwrap_err();
        assert_eq!(err, DescriptorError::DimensionOverflow(1 << 40));
    }

    #[test]
    fn test_alpha_beta_validation() {
        assert!(matches!(
            GemmDescriptor::new(4, 4, 4, 4, 4, 4, 2.0, 1.0),
            Err(DescriptorError::UnsupportedAlpha(a)) if a == 2.0
        ));
        assert!(matches!(
            GemmDescriptor::new(4, 4, 4, 4, 4, 4, -1.0, 0.5),
            Err(DescriptorError::UnsupportedBeta(b)) if b == 0.5
        ));
        let d = GemmDescriptor::new(4, 4, 4, 4, 4, 4, -1.0, 0.0).unwrap();
        assert_eq!(d.alpha(), Alpha::NegOne);
        assert_eq!(d.beta(), Beta::Zero);
    }

    #[test]
    fn test_equality_covers_every_field() {
        let d = base();
        assert_eq!(d, base());
        assert_ne!(d, base().with_precision(Precision::Single));
        assert_ne!(d, base().with_prefetch(PrefetchStrategy::AAhead));
        assert_ne!(d, base().with_transpose(true, false));
        assert_ne!(d, base().with_alignment(false, true));
        assert_ne!(
            d,
            GemmDescriptor::new(16, 8, 16, 16, 8, 16, 1.0, 0.0).unwrap()
        );
        assert_ne!(
            d,
            GemmDescriptor::new(16, 8, 16, 16, 8, 32, 1.0, 1.0).unwrap()
        );
    }

    #[test]
    fn test_hash_distinguishes_beta() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(base());
        set.insert(GemmDescriptor::new(16, 8, 16, 16, 8, 16, 1.0, 0.0).unwrap());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_alpha_apply() {
        assert_eq!(Alpha::One.apply(3.0f64), 3.0);
        assert_eq!(Alpha::NegOne.apply(3.0f64), -3.0);
    }

    #[test]
    fn test_flops_per_call() {
        assert_eq!(base().flops_per_call(), 2 * 16 * 8 * 16);
    }
}
