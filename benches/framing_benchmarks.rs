// ABOUTME: Benchmarks for frame chunking throughput and AES-CFB symmetric encrypt/decrypt

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rpipe::crypto::symmetric;

fn bench_symmetric_round_trip(c: &mut Criterion) {
    let key = symmetric::generate_symkey();
    let payload = vec![0x42u8; 64 * 1024];

    c.bench_function("aes_cfb_encrypt_64kb", |b| {
        b.iter(|| symmetric::encrypt(&key, black_box(&payload)).unwrap())
    });

    let ciphertext = symmetric::encrypt(&key, &payload).unwrap();
    c.bench_function("aes_cfb_decrypt_64kb", |b| {
        b.iter(|| symmetric::decrypt(&key, black_box(&ciphertext)).unwrap())
    });
}

fn bench_line_scan(c: &mut Criterion) {
    let mut data = vec![b'x'; 4096];
    data.push(b'\n');

    c.bench_function("scan_for_delimiter_4kb", |b| {
        b.iter(|| black_box(&data).iter().position(|&byte| byte == b'\n'))
    });
}

criterion_group!(benches, bench_symmetric_round_trip, bench_line_scan);
criterion_main!(benches);
