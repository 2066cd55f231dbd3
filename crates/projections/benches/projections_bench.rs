use std::sync::Arc;

use chrono::NaiveDate;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    BillingEvent, DocumentDates, DocumentEmittedData, DocumentKind, DocumentLine, LotId, Money,
    MovementDirection, ProductId, StockChangedData, TaxRate, WarehouseId,
};
use event_store::{AppendOptions, EventEnvelope, InMemoryEventStore, Version, store::EventStore};
use projections::{DocumentSummaryView, Projection, ProjectionProcessor, StockView};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn make_envelope(aggregate_id: AggregateId, version: i64, event: &BillingEvent) -> EventEnvelope {
    let event_type = match event {
        BillingEvent::DocumentEmitted(_) => "DocumentEmitted",
        BillingEvent::StockChanged(_) => "StockChanged",
    };
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Invoice")
        .event_type(event_type)
        .version(Version::new(version))
        .payload(event)
        .unwrap()
        .build()
}

fn emitted(document_id: AggregateId) -> BillingEvent {
    BillingEvent::DocumentEmitted(DocumentEmittedData {
        document_id,
        kind: DocumentKind::Invoice,
        customer: "Benchmark Customer".to_string(),
        warehouse_id: WarehouseId::new("MAIN"),
        lines: vec![DocumentLine::new(
            "SKU-001",
            "Widget",
            2,
            Money::from_cents(1000),
        )],
        dates: DocumentDates::new(date(1), date(10)),
        tax_rate: TaxRate::from_percent(12),
        subtotal: Money::from_cents(2000),
        tax: Money::from_cents(240),
        grand_total: Money::from_cents(2240),
        original_invoice: None,
        reason: None,
        emitted_at: chrono::Utc::now(),
    })
}

fn stock_changed(document_id: AggregateId) -> BillingEvent {
    BillingEvent::StockChanged(StockChangedData {
        document_id,
        product_id: ProductId::new("SKU-001"),
        warehouse_id: WarehouseId::new("MAIN"),
        direction: MovementDirection::Outbound,
        quantity: 2,
        unit_cost: Money::from_cents(800),
        lot: LotId::new(1),
        resulting_stock: 0,
        movement_date: date(10),
    })
}

/// Populate a store with N emissions, each producing 2 events.
async fn populate_store(store: &InMemoryEventStore, n: usize) {
    for _ in 0..n {
        let document_id = AggregateId::new();
        let events = vec![
            make_envelope(document_id, 1, &emitted(document_id)),
            make_envelope(document_id, 2, &stock_changed(document_id)),
        ];
        store.append(events, AppendOptions::new()).await.unwrap();
    }
}

fn bench_catch_up_100_documents(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(populate_store(&store, 100));

    c.bench_function("projections/catch_up_200_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut processor = ProjectionProcessor::new(store.clone());
                processor.register(Arc::new(StockView::new()));
                processor.register(Arc::new(DocumentSummaryView::new()));
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_catch_up_1000_documents(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(populate_store(&store, 1000));

    c.bench_function("projections/catch_up_2000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut processor = ProjectionProcessor::new(store.clone());
                processor.register(Arc::new(StockView::new()));
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_handle_single_stock_fact(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let view = StockView::new();

    c.bench_function("projections/handle_stock_changed", |b| {
        b.iter(|| {
            rt.block_on(async {
                let document_id = AggregateId::new();
                let envelope = make_envelope(document_id, 1, &stock_changed(document_id));
                view.handle(&envelope).await.unwrap();
            });
        });
    });
}

fn bench_query_stock_level(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let view = StockView::new();

    rt.block_on(async {
        populate_store(&store, 100).await;
        let mut processor = ProjectionProcessor::new(store);
        processor.register(Arc::new(view.clone()));
        processor.run_catch_up().await.unwrap();
    });

    let product = ProductId::new("SKU-001");
    let warehouse = WarehouseId::new("MAIN");

    c.bench_function("projections/query_stock_level", |b| {
        b.iter(|| {
            rt.block_on(async {
                view.stock_level(&product, &warehouse).await;
            });
        });
    });
}

fn bench_rebuild_100_documents(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(populate_store(&store, 100));

    let mut processor = ProjectionProcessor::new(store);
    processor.register(Arc::new(DocumentSummaryView::new()));
    let processor = Arc::new(processor);

    c.bench_function("projections/rebuild_200_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                processor.rebuild_all().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_documents,
    bench_catch_up_1000_documents,
    bench_handle_single_stock_fact,
    bench_query_stock_level,
    bench_rebuild_100_documents,
);
criterion_main!(benches);
