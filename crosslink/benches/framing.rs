//! Frame codec throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use crosslink::frame::{encode, FrameDecoder};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for size in [64usize, 1024, 16 * 1024] {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}B"), |b| {
            b.iter(|| encode(black_box(&payload)).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for size in [64usize, 1024, 16 * 1024] {
        let frame = encode(&vec![0xA5u8; size]).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}B"), |b| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                decoder.extend(black_box(&frame));
                decoder.next_message().unwrap().unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
