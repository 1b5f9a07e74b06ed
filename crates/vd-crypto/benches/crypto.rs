use vd_crypto::{checksum_hex, derive_file_key, encrypt, MasterKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt_file(bencher: divan::Bencher, size: usize) {
    let file_key = derive_file_key(&MasterKey::from_bytes([0xABu8; 32]), "bench.bin").unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data), divan::black_box(&file_key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_checksum_blob(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| checksum_hex(divan::black_box(&data)));
}

fn main() {
    divan::main();
}
