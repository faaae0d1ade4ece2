use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jitmm::{FixedSparsityGemm, GemmDescriptor, KernelCache, LoopBackend};

fn bench_dispatch_hit(c: &mut Criterion) {
    let cache = KernelCache::new(LoopBackend::new());
    let desc = GemmDescriptor::new(16, 16, 16, 16, 16, 16, 1.0, 1.0).unwrap();
    cache.dispatch_gemm(&desc).unwrap().unwrap();

    c.bench_function("dispatch_gemm_hit", |b| {
        b.iter(|| {
            let kernel = cache.dispatch_gemm(black_box(&desc)).unwrap().unwrap();
            black_box(kernel);
        })
    });
}

fn bench_gemm_kernel_16(c: &mut Criterion) {
    let cache = KernelCache::new(LoopBackend::new());
    let desc = GemmDescriptor::new(16, 16, 16, 16, 16, 16, 1.0, 1.0).unwrap();
    let kernel = cache.dispatch_gemm(&desc).unwrap().unwrap();
    let gemm = kernel.as_gemm::<f64>().unwrap();

    let a = vec![1.0f64; 16 * 16];
    let b = vec![1.0f64; 16 * 16];
    let mut out = vec![0.0f64; 16 * 16];

    c.bench_function("gemm_16x16x16", |bench| {
        bench.iter(|| unsafe {
            gemm.call(
                black_box(a.as_ptr()),
                black_box(b.as_ptr()),
                black_box(out.as_mut_ptr()),
            );
        })
    });
}

fn bench_fixed_sparsity_execute(c: &mut Criterion) {
    let cache = KernelCache::new(LoopBackend::new());
    let mut a = vec![0.0f64; 32 * 32];
    for i in 0..32 {
        a[i * 32 + i] = 1.0;
        a[i * 32 + (i + 7) % 32] = 0.5;
    }
    let handle =
        FixedSparsityGemm::create(&cache, 32, 64, 32, 32, 64, 64, 1.0, 1.0, &a).unwrap();
    let b = vec![1.0f64; 32 * 64];
    let mut out = vec![0.0f64; 32 * 64];

    c.bench_function("fixed_sparsity_execute_32x64x32", |bench| {
        bench.iter(|| {
            handle.execute(black_box(&b), black_box(&mut out)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_dispatch_hit,
    bench_gemm_kernel_16,
    bench_fixed_sparsity_execute
);
criterion_main!(benches);
