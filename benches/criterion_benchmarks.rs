use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use xordiff::block::{is_zero, xor_into};

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn bench_is_zero(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_zero");
    for &size in &[4096usize, 65536, 1 << 20] {
        group.throughput(Throughput::Bytes(size as u64));

        let zeros = vec![0u8; size];
        group.bench_with_input(BenchmarkId::new("all_zero", size), &zeros, |b, buf| {
            b.iter(|| is_zero(black_box(buf)));
        });

        // Nonzero first word: the short-circuit path.
        let mut early = vec![0u8; size];
        early[0] = 1;
        group.bench_with_input(BenchmarkId::new("first_word", size), &early, |b, buf| {
            b.iter(|| is_zero(black_box(buf)));
        });
    }
    group.finish();
}

fn bench_xor_into(c: &mut Criterion) {
    let mut group = c.benchmark_group("xor_into");
    for &size in &[4096usize, 65536, 1 << 20] {
        group.throughput(Throughput::Bytes(size as u64));
        let a = gen_data(size, 1);
        let b = gen_data(size, 2);
        let mut out = vec![0u8; size];
        group.bench_function(BenchmarkId::from_parameter(size), |bench| {
            bench.iter(|| xor_into(black_box(&a), black_box(&b), &mut out));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_is_zero, bench_xor_into);
criterion_main!(benches);
