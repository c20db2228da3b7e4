// SealStream framing benchmarks using criterion.
//
// Measures:
//   - Application frame encode / decode throughput
//   - Encrypt + frame + pipe + read + decrypt for one message

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bytes::Bytes;
use sealstream::frame::{read_frame, write_frame, Frame};
use sealtrust::PassphraseCipher;

const SIZES: &[usize] = &[64, 1024, 8192, 65536];

// ---------------------------------------------------------------------------
// Frame encode throughput
// ---------------------------------------------------------------------------

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    for &size in SIZES {
        let frame = Frame::new(Bytes::from(vec![0xABu8; size]));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &frame,
            |b, f| {
                b.iter(|| {
                    black_box(f.encode());
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Frame decode throughput
// ---------------------------------------------------------------------------

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    for &size in SIZES {
        let encoded = Frame::new(Bytes::from(vec![0xABu8; size])).encode();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &encoded,
            |b, data| {
                b.iter(|| {
                    black_box(Frame::decode(black_box(data)).unwrap());
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Sealed message over an in-process pipe
// ---------------------------------------------------------------------------

fn bench_sealed_pipe(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cipher = PassphraseCipher::new("1234567890");
    let cipher = &cipher;
    let mut group = c.benchmark_group("sealed_pipe");
    for &size in &SIZES[..3] {
        let plaintext = vec![0x5Au8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &plaintext,
            |b, pt| {
                b.to_async(&rt).iter(|| async move {
                    let (mut tx, mut rx) = tokio::io::duplex(2 * size + 64);
                    let ciphertext = cipher.encrypt(pt).unwrap();
                    write_frame(&mut tx, &ciphertext).await.unwrap();
                    let got = read_frame(&mut rx, usize::MAX).await.unwrap();
                    black_box(cipher.decrypt(&got).unwrap());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_frame_encode, bench_frame_decode, bench_sealed_pipe);
criterion_main!(benches);
