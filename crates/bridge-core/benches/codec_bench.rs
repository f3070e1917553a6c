//! Criterion benchmarks for the Serial Bridge text codec.
//!
//! The multiplex server decodes every inbound frame and encodes one `data`
//! frame per subscriber per serial read, so both directions sit on the hot
//! path between a serial port and its network consumers.
//!
//! Run with:
//! ```bash
//! cargo bench --package bridge-core --bench codec_bench
//! ```

use bridge_core::protocol::iter_frames;
use bridge_core::{decode, encode, Message};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_subscribe_all() -> Message {
    Message::bare("subscribe")
}

fn make_subscribe_many() -> Message {
    Message::new("subscribe", ["bench-a", "bench-b", "bench-c", "bench-d"])
}

fn make_send_line() -> Message {
    Message::new("send", [&b"bench-a"[..], &b"AT+RST\r\n"[..]])
}

fn make_data(len: usize) -> Message {
    let bytes: Vec<u8> = (0..len).map(|i| b' ' + (i % 95) as u8).collect();
    Message::new("data", [&b"bench-a"[..], &bytes[..]])
}

fn fixtures() -> Vec<(&'static str, Message)> {
    vec![
        ("subscribe", make_subscribe_all()),
        ("subscribe(4)", make_subscribe_many()),
        ("send", make_send_line()),
        ("data(64)", make_data(64)),
        ("data(1024)", make_data(1024)),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Benchmarks `encode` for each fixture.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| encode(black_box(msg)))
        });
    }
    group.finish();
}

/// Benchmarks `decode` for each fixture from pre-encoded bytes.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, msg) in fixtures() {
        let bytes = encode(&msg);
        group.bench_with_input(BenchmarkId::new("msg", name), &bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Benchmarks streaming a burst of `data` frames through the frame iterator.
fn bench_stream_burst(c: &mut Criterion) {
    let mut wire = Vec::new();
    for _ in 0..100 {
        wire.extend_from_slice(&encode(&make_data(64)));
        wire.extend_from_slice(b"\r\n");
    }

    c.bench_function("iter_frames_burst_100", |b| {
        b.iter(|| {
            let count = iter_frames(black_box(&wire[..]))
                .filter(|m| m.is_ok())
                .count();
            assert_eq!(count, 100);
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_stream_burst);
criterion_main!(benches);
