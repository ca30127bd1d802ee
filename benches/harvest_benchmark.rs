//! Hot paths of the discovery phase: locator normalization and concurrent
//! upserts into the shared index.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use catalog_harvester::crawling::DiscoveryIndex;
use catalog_harvester::domain::normalize;

fn locators(n: u32) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://shop.test/producto-{i}/p?sku={i},{i}&utm_source=listing#top"))
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let input = locators(1_000);
    c.bench_function("normalize 1000 locators", |b| {
        b.iter(|| {
            for locator in &input {
                black_box(normalize(black_box(locator)));
            }
        });
    });
}

/// `categories` concurrent writers, each upserting the same 1000 keys
async fn upsert_round(categories: usize) {
    let index = DiscoveryIndex::new();
    let keys: Vec<_> = locators(1_000).iter().filter_map(|l| normalize(l)).collect();

    let writers: Vec<_> = (0..categories)
        .map(|c| {
            let index = index.clone();
            let keys = keys.clone();
            tokio::spawn(async move {
                let category = format!("category-{c}");
                for key in keys {
                    index.upsert(key, "item", &category).await;
                }
            })
        })
        .collect();

    for writer in futures::future::join_all(writers).await {
        black_box(writer.is_ok());
    }
}

fn bench_concurrent_upsert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent upsert");
    for categories in [1, 4, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(categories), &categories, |b, &n| {
            b.to_async(&rt).iter(|| upsert_round(n));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_concurrent_upsert);
criterion_main!(benches);
