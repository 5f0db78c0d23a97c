//! Fingerprint hot-path overhead
//!
//! The fingerprint engine runs on a hot call path shared with arbitrary
//! application code; these benchmarks track its cost for shallow and
//! recursive call paths and for the pure fold.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netlens::fingerprint::{fold_frames, Fingerprinter};
use netlens::{call_site, CodeSource};

#[inline(never)]
fn resolve_here(engine: &Fingerprinter) -> CodeSource {
    engine.code_source(call_site!())
}

#[inline(never)]
fn resolve_recursive(engine: &Fingerprinter, depth: usize) -> CodeSource {
    if depth == 0 {
        resolve_here(engine)
    } else {
        resolve_recursive(engine, depth - 1)
    }
}

fn bench_shallow_path(c: &mut Criterion) {
    let engine = Fingerprinter::new();
    c.bench_function("fingerprint_shallow", |b| {
        b.iter(|| black_box(resolve_here(&engine)));
    });
}

fn bench_recursive_path(c: &mut Criterion) {
    let engine = Fingerprinter::new();
    c.bench_function("fingerprint_recursive_32", |b| {
        b.iter(|| black_box(resolve_recursive(&engine, 32)));
    });
}

fn bench_fold(c: &mut Criterion) {
    let frames = [
        "app::net::client::send",
        "app::net::client::Pool::checkout",
        "app::worker::run",
        "app::main",
    ];
    c.bench_function("fold_frames_4", |b| {
        b.iter(|| black_box(fold_frames(frames.iter().copied())));
    });
}

criterion_group!(
    benches,
    bench_shallow_path,
    bench_recursive_path,
    bench_fold
);
criterion_main!(benches);
