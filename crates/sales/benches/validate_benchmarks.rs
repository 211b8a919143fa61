use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::HashMap;

use kasir_core::{Money, ProductId, index_by_id};
use kasir_sales::{validate, CheckoutItem, CheckoutRequest, Product};

fn catalog(size: i64) -> HashMap<ProductId, Product> {
    index_by_id((1..=size).map(|id| {
        Product::new(ProductId::new(id), format!("Product {id}"), Money::new(100 + id), 1_000_000)
    }))
}

fn checkout(lines: i64, catalog_size: i64) -> CheckoutRequest {
    let items = (0..lines)
        .map(|i| CheckoutItem::new(ProductId::new(i % catalog_size + 1), 1 + i % 3))
        .collect();
    match CheckoutRequest::new(items) {
        Ok(request) => request,
        Err(err) => panic!("benchmark request rejected: {err}"),
    }
}

fn bench_validate(c: &mut Criterion) {
    let products = catalog(500);
    let mut group = c.benchmark_group("validate_checkout");

    for lines in [1i64, 10, 100, 1_000] {
        let request = checkout(lines, 500);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &request, |b, request| {
            b.iter(|| validate(black_box(request), black_box(&products)))
        });
    }

    group.finish();
}

fn bench_request_shape(c: &mut Criterion) {
    let request = checkout(1_000, 50);
    c.bench_function("net_quantities_1000_lines", |b| {
        b.iter(|| black_box(&request).net_quantities())
    });
}

criterion_group!(benches, bench_validate, bench_request_shape);
criterion_main!(benches);
