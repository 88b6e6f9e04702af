use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seismo_mmdb::{DataValue, LookupAddress, Reader, SingleThreadedReader};
use std::hint::black_box;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{map, s, MmdbBuilder};

/// City-like database: one /16 per second octet of 10.0.0.0/8, records sharing
/// a continent map and key strings through pointers
fn build_database(record_size: u16) -> Vec<u8> {
    let mut builder = MmdbBuilder::new(6, record_size);
    let continent = builder.data().write(&map(&[
        ("code", s("EU")),
        ("geoname_id", DataValue::Uint32(6_255_148)),
        ("names", map(&[("en", s("Europe")), ("de", s("Europa")), ("fr", s("Europe"))])),
    ]));
    let continent_key = builder.data().write(&s("continent"));
    let city_key = builder.data().write(&s("city"));
    let location_key = builder.data().write(&s("location"));

    for b in 0..=255u32 {
        let record = builder.data().write_map_raw(&[
            (DataValue::Pointer(continent_key), DataValue::Pointer(continent)),
            (DataValue::Pointer(city_key), map(&[("names", map(&[("en", s(&format!("City {}", b)))]))])),
            (
                DataValue::Pointer(location_key),
                map(&[
                    ("latitude", DataValue::Double(48.0 + b as f64 / 100.0)),
                    ("longitude", DataValue::Double(2.0 + b as f64 / 100.0)),
                ]),
            ),
        ]);
        builder.insert(&format!("10.{}.0.0/16", b), record);
    }
    builder.build()
}

fn random_addresses(count: usize) -> Vec<LookupAddress> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|i| {
            let mut bytes = [0u8; 4];
            rng.fill(&mut bytes[..]);
            // Half the queries land inside the populated 10.0.0.0/8
            if i % 2 == 0 {
                bytes[0] = 10;
            }
            LookupAddress::V4(bytes)
        })
        .collect()
}

fn bench_lookup(c: &mut Criterion) {
    let addresses = random_addresses(1000);
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(addresses.len() as u64));

    for record_size in [24u16, 28, 32] {
        let bytes = build_database(record_size);

        let reader = Reader::from_bytes(bytes.clone()).unwrap();
        group.bench_with_input(
            BenchmarkId::new("reader", record_size),
            &addresses,
            |b, addrs| {
                b.iter(|| {
                    for addr in addrs {
                        black_box(reader.get(addr).unwrap());
                    }
                });
            },
        );

        let mut single = SingleThreadedReader::from_bytes(bytes).unwrap();
        group.bench_with_input(
            BenchmarkId::new("single_threaded", record_size),
            &addresses,
            |b, addrs| {
                b.iter(|| {
                    for addr in addrs {
                        black_box(single.get(addr).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let bytes = build_database(28);
    c.bench_function("open_from_bytes", |b| {
        b.iter(|| black_box(Reader::from_bytes(bytes.clone()).unwrap()));
    });
}

criterion_group!(benches, bench_lookup, bench_open);
criterion_main!(benches);
