//! Runtime instruction-set dispatch for kernel bodies.
//!
//! With the `simd` feature, kernel closures run under `pulp`'s arch
//! dispatch so their inner loops are compiled for the best instruction set
//! available at runtime. Tiny kernels skip the dispatch; the threshold is
//! a heuristic and correctness does not depend on it.

#[cfg(feature = "simd")]
const MIN_DISPATCH_FLOPS: u64 = 512;

#[inline(always)]
pub(crate) fn with_arch<R>(flops: u64, f: impl FnOnce() -> R) -> R {
    #[cfg(feature = "simd")]
    {
        if flops >= MIN_DISPATCH_FLOPS {
            return pulp::Arch::new().dispatch(f);
        }
        f()
    }
    #[cfg(not(feature = "simd"))]
    {
        let _ = flops;
        f()
    }
}
