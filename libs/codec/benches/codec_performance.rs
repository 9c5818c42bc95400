//! Encode/decode throughput for typical frame sizes
//!
//! The happy path should stay allocation-light: one buffer per encode, one
//! copy of payload and correlation per decode.

use codec::{BinaryMessage, MessageType};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use types::{Atom, PacketGroup};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [0usize, 64, 1024, 16 * 1024] {
        let msg = BinaryMessage::new(MessageType::Submit, vec![0xAB; size])
            .with_sequence(1)
            .with_correlation("atom-0001");
        group.throughput(Throughput::Bytes(msg.encoded_len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &msg, |b, msg| {
            b.iter(|| black_box(msg.encode()));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [0usize, 64, 1024, 16 * 1024] {
        let bytes = BinaryMessage::new(MessageType::Result, vec![0xCD; size])
            .with_correlation("atom-0001")
            .encode()
            .expect("encode");
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| black_box(BinaryMessage::decode(black_box(bytes))));
        });
    }

    group.bench_function("reject_short_buffer", |b| {
        let short = [1u8, 1, 0, 0];
        b.iter(|| black_box(BinaryMessage::decode(black_box(&short))).is_err());
    });

    group.finish();
}

fn bench_submit_frame(c: &mut Criterion) {
    let atom = Atom::new(
        "atom-bench",
        PacketGroup::DF,
        "transform",
        json!({"values": [1, 2, 3, 4, 5], "op": "sum"}),
    );
    c.bench_function("submit_frame_json", |b| {
        b.iter(|| {
            let msg = BinaryMessage::submit(black_box(&atom)).expect("submit");
            black_box(msg.encode())
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_submit_frame);
criterion_main!(benches);
