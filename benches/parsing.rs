use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

use mimefix::{MessageSource, TreeParser};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn bench_parse_nested(c: &mut Criterion) {
    let bytes = std::fs::read(fixture("nested.eml")).unwrap();

    c.bench_function("parse_nested_multipart", |b| {
        b.iter(|| {
            let source = MessageSource::from_bytes(bytes.clone());
            TreeParser::default().parse(&source).unwrap().count_parts()
        })
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    let bytes = std::fs::read(fixture("nested.eml")).unwrap();
    let source = MessageSource::from_bytes(bytes);
    let tree = TreeParser::default().parse(&source).unwrap();

    c.bench_function("serialize_nested_multipart", |b| {
        b.iter(|| mimefix::serialize(&tree).len())
    });
}

fn bench_base64_decode(c: &mut Criterion) {
    let data: Vec<u8> = (0u32..64 * 1024).map(|i| (i % 251) as u8).collect();
    let encoded = mimefix::codec::base64::encode(&data, mimefix::model::content::LineEnding::Lf);

    c.bench_function("base64_decode_64k", |b| {
        b.iter(|| mimefix::codec::base64::decode(&encoded).unwrap().len())
    });
}

criterion_group!(benches, bench_parse_nested, bench_roundtrip, bench_base64_decode);
criterion_main!(benches);
