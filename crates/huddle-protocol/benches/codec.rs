//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use huddle_protocol::{codec, MessageInfo, ServerEvent};

fn sample_message(len: usize) -> ServerEvent {
    ServerEvent::NewMessage {
        message: MessageInfo {
            id: 42,
            room_id: "k3x9a0zq".to_string(),
            nickname: "alice".to_string(),
            content: "x".repeat(len),
            timestamp: 1_700_000_000_000,
            filtered: false,
        },
    }
}

fn bench_encode_message(c: &mut Criterion) {
    let event = sample_message(64);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("new_message_64B", |b| {
        b.iter(|| codec::encode(black_box(&event)))
    });
    group.finish();
}

fn bench_decode_send(c: &mut Criterion) {
    let text = format!(r#"{{"type":"send-message","content":"{}"}}"#, "x".repeat(64));

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("send_message_64B", |b| {
        b.iter(|| codec::decode(black_box(&text)))
    });
    group.finish();
}

fn bench_decode_join(c: &mut Criterion) {
    let text = r#"{"type":"join-room","roomId":"k3x9a0zq","nickname":"alice","sessionId":"0b6c1f9e-3d1a-4c55-9d0e-1f2a3b4c5d6e"}"#;

    c.bench_function("decode_join_room", |b| {
        b.iter(|| codec::decode(black_box(text)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_message,
    bench_decode_send,
    bench_decode_join
);
criterion_main!(benches);
