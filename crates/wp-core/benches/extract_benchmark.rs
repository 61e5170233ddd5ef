//! Page model extraction benchmarks
//!
//! Measures:
//! - Extraction of flat and nested pages
//! - Re-extraction with a warm identity table
//! - Compact rendering of a snapshot

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use wp_core::config::ExtractorConfig;
use wp_core::dom::{PageExtractor, render_compact};
use wp_core::testing::{FakeDriver, FakePage, el};

fn listing_page(rows: usize) -> FakePage {
    let mut list = el("ul");
    for i in 0..rows {
        list = list.child(
            el("li")
                .child(el("a").text(format!("Product {}", i)).attr("href", "/p"))
                .child(el("span").text("$19.99"))
                .child(el("button").text("Add to cart")),
        );
    }
    FakePage::new("https://shop.test/list", "Listing").with_roots(vec![el("body").child(list)])
}

fn bench_extract(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("extract");

    for rows in [10, 100, 400] {
        let driver = FakeDriver::new(listing_page(rows));
        group.throughput(Throughput::Elements((rows * 4) as u64));

        group.bench_with_input(BenchmarkId::new("cold", rows), &rows, |b, _| {
            b.iter(|| {
                let mut extractor = PageExtractor::new(ExtractorConfig::default());
                rt.block_on(async { black_box(extractor.extract(&driver).await.unwrap()) })
            })
        });

        let mut warm = PageExtractor::new(ExtractorConfig::default());
        group.bench_with_input(BenchmarkId::new("warm", rows), &rows, |b, _| {
            b.iter(|| rt.block_on(async { black_box(warm.extract(&driver).await.unwrap()) }))
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let driver = FakeDriver::new(listing_page(200));
    let mut extractor = PageExtractor::new(ExtractorConfig::default());
    let snapshot = rt.block_on(extractor.extract(&driver)).unwrap();

    c.bench_function("render_compact_200_rows", |b| {
        b.iter(|| black_box(render_compact(&snapshot, 80)))
    });
}

criterion_group!(benches, bench_extract, bench_render);
criterion_main!(benches);
