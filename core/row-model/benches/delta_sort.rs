//! FILENAME: core/row-model/benches/delta_sort.rs
//! PURPOSE: Transaction refresh cost with and without delta sort.
//!
//! Run with:
//! `cargo bench -p row-model --bench delta_sort`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use engine::{Record, RowData, SortOption};
use row_model::{ClientSideRowModel, GridCallbacks, GridOptions, RowDataTransaction};

const ROWS: usize = 20_000;
const UPDATES: usize = 20;

fn row(id: usize, value: usize) -> RowData {
    Record::new()
        .with("id", id.to_string())
        .with("value", (value * 7919 % ROWS) as i64)
        .into_data()
}

fn build_model(delta_sort: bool) -> ClientSideRowModel {
    let mut options = GridOptions::default();
    options.delta_sort = delta_sort;
    options.columns.sort_model = vec![SortOption::asc("value")];
    let mut model = ClientSideRowModel::new(options, GridCallbacks::new().with_row_id_field("id"));
    model.set_row_data((0..ROWS).map(|i| row(i, i)).collect());
    model
}

fn bench_update_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_model/update_20_of_20k");
    group.throughput(Throughput::Elements(UPDATES as u64));

    for delta_sort in [true, false] {
        let mut model = build_model(delta_sort);
        let mut round = 0usize;
        let label = if delta_sort { "delta" } else { "full" };
        group.bench_function(BenchmarkId::new("sorted", label), |b| {
            b.iter(|| {
                round += 1;
                let update = (0..UPDATES).map(|i| row(i * 997 % ROWS, i + round)).collect();
                let result = model.apply_transaction(RowDataTransaction::new().with_update(update));
                black_box(result.update.len());
            });
        });
    }

    group.finish();
}

fn bench_async_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_model/async_batch");
    let mut model = build_model(true);
    let mut next_id = ROWS;

    group.bench_function("10_adds_per_flush", |b| {
        b.iter(|| {
            for _ in 0..10 {
                let add = vec![row(next_id, next_id)];
                next_id += 1;
                model.apply_transaction_async(RowDataTransaction::new().with_add(add), None);
            }
            black_box(model.flush_async_transactions().len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_update_transaction, bench_async_batch);
criterion_main!(benches);
