//! Matrix-copy kernel descriptors.
//!
//! The copy family is structurally parallel to the multiply family but
//! simpler: a kernel copies (or zero-fills) an `n`-row region of `m`
//! contiguous elements per row, walking the source with line stride `ldi`
//! and the destination with line stride `ldo`. Elements are opaque;
//! only their byte size matters.

use crate::gemm::PrefetchStrategy;
use crate::{DescriptorError, Result};

/// Immutable, value-comparable description of one copy kernel.
///
/// Same keying rules as [`GemmDescriptor`](crate::GemmDescriptor): equality
/// and hashing cover every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatcopyDescriptor {
    typesize: u32,
    m: u32,
    n: u32,
    ldi: u32,
    ldo: u32,
    zero_source: bool,
    prefetch: PrefetchStrategy,
    unroll: u32,
}

impl MatcopyDescriptor {
    /// Build a normalized copy descriptor.
    ///
    /// `typesize` is the element size in bytes and must be 1, 2, 4 or 8.
    /// `m` is the contiguous row length in elements, `n` the row count.
    /// Negative dimensions are clamped to zero; leading dimensions shorter
    /// than a row are widened to the row length, so a freshly constructed
    /// descriptor always satisfies `ldi >= m` and `ldo >= m`.
    pub fn new(typesize: u32, m: i64, n: i64, ldi: i64, ldo: i64) -> Result<Self> {
        if !matches!(typesize, 1 | 2 | 4 | 8) {
            return Err(DescriptorError::UnsupportedTypesize(typesize));
        }
        let clamp = |value: i64| -> Result<u32> {
            if value > u32::MAX as i64 {
                return Err(DescriptorError::DimensionOverflow(value));
            }
            Ok(value.max(0) as u32)
        };
        let m = clamp(m)?;
        Ok(MatcopyDescriptor {
            typesize,
            m,
            n: clamp(n)?,
            ldi: clamp(ldi)?.max(m),
            ldo: clamp(ldo)?.max(m),
            zero_source: false,
            prefetch: PrefetchStrategy::None,
            unroll: 0,
        })
    }

    /// Request a zero-fill kernel: the logical region of the destination is
    /// overwritten with zeros and the source operand is ignored.
    pub fn with_zero_source(mut self, zero_source: bool) -> Self {
        self.zero_source = zero_source;
        self
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchStrategy) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Unroll factor hint for the generated row loop; 0 lets the backend
    /// choose.
    pub fn with_unroll(mut self, unroll: u32) -> Self {
        self.unroll = unroll;
        self
    }

    pub fn typesize(&self) -> u32 {
        self.typesize
    }

    pub fn m(&self) -> u32 {
        self.m
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn ldi(&self) -> u32 {
        self.ldi
    }

    pub fn ldo(&self) -> u32 {
        self.ldo
    }

    pub fn zero_source(&self) -> bool {
        self.zero_source
    }

    pub fn prefetch(&self) -> PrefetchStrategy {
        self.prefetch
    }

    pub fn unroll(&self) -> u32 {
        self.unroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typesize_validation() {
        assert!(matches!(
            MatcopyDescriptor::new(3, 4, 4, 4, 4),
            Err(DescriptorError::UnsupportedTypesize(3))
        ));
        for ts in [1, 2, 4, 8] {
            assert!(MatcopyDescriptor::new(ts, 4, 4, 4, 4).is_ok());
        }
    }

    #[test]
    fn test_short_leading_dims_widen_to_row() {
        let d = MatcopyDescriptor::new(4, 16, 8, 3, 0).unwrap();
        assert_eq!(d.ldi(), 16);
        assert_eq!(d.ldo(), 16);
    }

    #[test]
    fn test_negative_dims_clamp() {
        let d = MatcopyDescriptor::new(8, -4, 7, 0, 0).unwrap();
        assert_eq!(d.m(), 0);
        assert_eq!(d.n(), 7);
    }

    #[test]
    fn test_zero_source_is_part_of_the_key() {
        let d = MatcopyDescriptor::new(4, 8, 8, 8, 8).unwrap();
        assert_ne!(d, d.with_zero_source(true));
        assert_ne!(d, d.with_unroll(4));
        assert_ne!(d, d.with_prefetch(PrefetchStrategy::BViaC));
    }
}
