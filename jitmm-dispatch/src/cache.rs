//! Descriptor-keyed kernel cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jitmm_backend::{
    CodegenBackend, CompileOutcome, CompiledKernel, CopyKernel, GemmKernel, KernelCode,
    KernelElement, PatternGemmKernel, TargetIsa,
};
use jitmm_descriptor::{GemmDescriptor, MatcopyDescriptor};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    Gemm(GemmDescriptor),
    Matcopy(MatcopyDescriptor),
}

/// A caller's reference to a cached kernel.
///
/// The cache keeps its own strong reference; a `KernelRef` is a second one,
/// so the kernel outlives any cache eviction that happens while the caller
/// still holds it. Hand the ref back via [`KernelCache::release`] when the
/// caller is done with the kernel for good.
pub struct KernelRef {
    key: CacheKey,
    kernel: Arc<CompiledKernel>,
}

impl KernelRef {
    pub fn kernel(&self) -> &CompiledKernel {
        &self.kernel
    }

    pub fn isa(&self) -> TargetIsa {
        self.kernel.isa()
    }

    pub fn flops_per_call(&self) -> u64 {
        self.kernel.flops_per_call()
    }

    /// The dense multiply entry point, if this kernel has one for `T`.
    pub fn as_gemm<T: KernelElement>(&self) -> Option<&GemmKernel<T>> {
        T::gemm_code(self.kernel.code())
    }

    /// The fixed-sparsity entry point, if this kernel has one for `T`.
    pub fn as_pattern_gemm<T: KernelElement>(&self) -> Option<&PatternGemmKernel<T>> {
        T::pattern_code(self.kernel.code())
    }

    /// The copy entry point, if this is a matcopy kernel.
    pub fn as_matcopy(&self) -> Option<&CopyKernel> {
        match self.kernel.code() {
            KernelCode::Matcopy(k) => Some(k),
            _ => None,
        }
    }
}

fn lock<K, V>(map: &Mutex<HashMap<K, V>>) -> MutexGuard<'_, HashMap<K, V>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide (or test-local) kernel cache over one backend.
///
/// Concurrent-compile policy is race-and-keep-one: the map lock is not held
/// across backend compilation, so two threads missing on the same
/// descriptor may both compile, and the insert keeps exactly one kernel
/// visible while the loser's copy is dropped. The backend is referentially
/// transparent, so the race never produces observably different kernels.
pub struct KernelCache<B> {
    backend: B,
    gemm: Mutex<HashMap<GemmDescriptor, Arc<CompiledKernel>>>,
    matcopy: Mutex<HashMap<MatcopyDescriptor, Arc<CompiledKernel>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<B: CodegenBackend> KernelCache<B> {
    pub fn new(backend: B) -> Self {
        KernelCache {
            backend,
            gemm: Mutex::new(HashMap::new()),
            matcopy: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Look up or compile the multiply kernel for `desc`.
    ///
    /// `Ok(None)` means the backend refused the shape; the refusal is not
    /// cached (re-asking is cheap and deterministic) and the caller is
    /// expected to fall back.
    pub fn dispatch_gemm(&self, desc: &GemmDescriptor) -> Result<Option<KernelRef>> {
        if let Some(kernel) = lock(&self.gemm).get(desc) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(KernelRef {
                key: CacheKey::Gemm(*desc),
                kernel: kernel.clone(),
            }));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        match self.backend.compile_gemm(desc)? {
            CompileOutcome::Refused(reason) => {
                log::debug!("gemm compile refused: {reason}");
                Ok(None)
            }
            CompileOutcome::Compiled(kernel) => {
                let mut map = lock(&self.gemm);
                let entry = map.entry(*desc).or_insert(kernel);
                Ok(Some(KernelRef {
                    key: CacheKey::Gemm(*desc),
                    kernel: entry.clone(),
                }))
            }
        }
    }

    /// Look up or compile the copy kernel for `desc`; same contract as
    /// [`dispatch_gemm`](Self::dispatch_gemm).
    pub fn dispatch_matcopy(&self, desc: &MatcopyDescriptor) -> Result<Option<KernelRef>> {
        if let Some(kernel) = lock(&self.matcopy).get(desc) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(KernelRef {
                key: CacheKey::Matcopy(*desc),
                kernel: kernel.clone(),
            }));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        match self.backend.compile_matcopy(desc)? {
            CompileOutcome::Refused(reason) => {
                log::debug!("matcopy compile refused: {reason}");
                Ok(None)
            }
            CompileOutcome::Compiled(kernel) => {
                let mut map = lock(&self.matcopy);
                let entry = map.entry(*desc).or_insert(kernel);
                Ok(Some(KernelRef {
                    key: CacheKey::Matcopy(*desc),
                    kernel: entry.clone(),
                }))
            }
        }
    }

    /// Give up a previously dispatched reference.
    ///
    /// When the released ref is the last one outstanding, the cache entry
    /// is dropped as well, making the backend's resources eligible for
    /// release; a later dispatch of the same descriptor recompiles.
    pub fn release(&self, kernel: KernelRef) {
        match kernel.key {
            CacheKey::Gemm(desc) => release_entry(&self.gemm, &desc, &kernel.kernel),
            CacheKey::Matcopy(desc) => release_entry(&self.matcopy, &desc, &kernel.kernel),
        }
    }

    /// Number of kernels currently cached, across both families.
    pub fn len(&self) -> usize {
        lock(&self.gemm).len() + lock(&self.matcopy).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn release_entry<K: Eq + Hash>(
    map: &Mutex<HashMap<K, Arc<CompiledKernel>>>,
    key: &K,
    kernel: &Arc<CompiledKernel>,
) {
    let mut map = lock(map);
    if let Some(entry) = map.get(key) {
        // <= 2: only the cache and the ref being released still hold it.
        if Arc::ptr_eq(entry, kernel) && Arc::strong_count(entry) <= 2 {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitmm_backend::LoopBackend;
    use jitmm_descriptor::{Precision, PrefetchStrategy};

    fn desc() -> GemmDescriptor {
        GemmDescriptor::new(8, 8, 8, 8, 8, 8, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_hit_returns_same_kernel() {
        let cache = KernelCache::new(LoopBackend::new());
        let first = cache.dispatch_gemm(&desc()).unwrap().unwrap();
        let second = cache.dispatch_gemm(&desc()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first.kernel, &second.kernel));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_descriptors_distinct_entries() {
        let cache = KernelCache::new(LoopBackend::new());
        cache.dispatch_gemm(&desc()).unwrap().unwrap();
        cache
            .dispatch_gemm(&desc().with_prefetch(PrefetchStrategy::AAhead))
            .unwrap()
            .unwrap();
        cache
            .dispatch_gemm(&desc().with_precision(Precision::Single))
            .unwrap()
            .unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_refusal_is_none_and_not_cached() {
        let cache = KernelCache::new(LoopBackend::new());
        let empty = GemmDescriptor::new(0, 8, 8, 8, 8, 8, 1.0, 1.0).unwrap();
        assert!(cache.dispatch_gemm(&empty).unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_release_last_ref_evicts() {
        let cache = KernelCache::new(LoopBackend::new());
        let first = cache.dispatch_gemm(&desc()).unwrap().unwrap();
        let second = cache.dispatch_gemm(&desc()).unwrap().unwrap();

        cache.release(first);
        assert_eq!(cache.len(), 1, "entry stays while a ref is outstanding");
        cache.release(second);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_gemm_and_matcopy_share_the_cache_object() {
        let cache = KernelCache::new(LoopBackend::new());
        cache.dispatch_gemm(&desc()).unwrap().unwrap();
        let copy = MatcopyDescriptor::new(8, 4, 4, 4, 4).unwrap();
        let kernel = cache.dispatch_matcopy(&copy).unwrap().unwrap();
        assert!(kernel.as_matcopy().is_some());
        assert!(kernel.as_gemm::<f64>().is_none());
        assert_eq!(cache.len(), 2);
    }
}
