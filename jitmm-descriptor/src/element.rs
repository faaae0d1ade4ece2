//! Scalar type bounds for generated kernels.

use crate::gemm::Precision;

/// Element types that generated kernels can operate on.
///
/// Unlike a blanket scalar bound, this is a closed set: the code generator
/// only emits single- and double-precision kernels, and each element type
/// carries the [`Precision`] tag that descriptor construction and the
/// backend's vector-width query key off.
pub trait Element:
    Copy
    + Send
    + Sync
    + std::ops::Mul<Output = Self>
    + std::ops::Add<Output = Self>
    + std::ops::Neg<Output = Self>
    + num_traits::Zero
    + num_traits::One
    + PartialEq
    + 'static
{
    /// The precision flag this element type maps to in a descriptor.
    const PRECISION: Precision;
}

impl Element for f32 {
    const PRECISION: Precision = Precision::Single;
}

impl Element for f64 {
    const PRECISION: Precision = Precision::Double;
}
