use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pact_proxy::interaction::Catalog;
use pact_proxy::request::NormalizedRequest;
use serde_json::json;

fn populate_catalog(count: usize) -> Catalog {
    let catalog = Catalog::new();
    for i in 0..count {
        let template = json!({
            "description": format!("create order {i}"),
            "request": {
                "method": "POST",
                "path": format!("/api/v1/orders{i}"),
                "body": {"customer": "bob", "items": [{"sku": "A1", "qty": 2}], "note": "fragile"}
            }
        });
        catalog
            .register_interaction(&serde_json::to_vec(&template).unwrap(), None)
            .unwrap();
    }
    catalog
}

fn order_request(path: &str) -> NormalizedRequest {
    let body = json!({"customer": "bob", "items": [{"sku": "A1", "qty": 2}], "note": "fragile"});
    NormalizedRequest::from_parts(
        path,
        Some("page=1&filter[status]=open"),
        Some("application/json"),
        &serde_json::to_vec(&body).unwrap(),
    )
}

fn bench_find_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_find_all");

    for count in [10, 100, 1000].iter() {
        let catalog = populate_catalog(*count);
        let last = format!("/api/v1/orders{}", count - 1);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("match_last", count), count, |b, _| {
            b.iter(|| catalog.find_all(black_box(&last), black_box("POST")));
        });
        group.bench_with_input(BenchmarkId::new("match_none", count), count, |b, _| {
            b.iter(|| catalog.find_all(black_box("/not/found"), black_box("POST")));
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraint_eval");

    let catalog = populate_catalog(1);
    let interaction = catalog.load("create order 0").unwrap();
    catalog
        .register_constraint(
            br#"{"interaction":"create order 0","path":"$.query.filter.status","values":["open"]}"#,
        )
        .unwrap();
    let matching = order_request("/api/v1/orders0");
    let mismatching = NormalizedRequest::from_parts(
        "/api/v1/orders0",
        None,
        Some("application/json"),
        br#"{"customer":"alice"}"#,
    );

    group.throughput(Throughput::Elements(1));
    group.bench_function("all_satisfied", |b| {
        b.iter(|| interaction.evaluate(black_box(&matching), black_box(&catalog)));
    });
    group.bench_function("violations", |b| {
        b.iter(|| interaction.evaluate(black_box(&mismatching), black_box(&catalog)));
    });

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_request", |b| {
        b.iter(|| order_request(black_box("/api/v1/orders0")));
    });
}

criterion_group!(benches, bench_find_all, bench_evaluate, bench_normalize);
criterion_main!(benches);
