use std::sync::Arc;

use chrono::NaiveDate;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    BillingService, DocumentDates, DocumentLine, InventoryEngine, Money, ProductId, TaxRate,
    WarehouseId,
};
use domain::{Aggregate, Invoice};
use event_store::InMemoryEventStore;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn stocked_engine(lots: u32, units_per_lot: u32) -> Arc<InventoryEngine> {
    let engine = Arc::new(InventoryEngine::new());
    let product = ProductId::new("SKU-BENCH");
    let warehouse = WarehouseId::new("MAIN");
    engine.register(product.clone(), warehouse.clone());
    for i in 0..lots {
        engine
            .allocate_inbound(
                &product,
                &warehouse,
                units_per_lot,
                Money::from_cents(800 + i as i64),
                date(1 + i % 28),
                AggregateId::new(),
            )
            .unwrap();
    }
    engine
}

fn invoice_draft(quantity: u32) -> Invoice {
    let mut draft = Invoice::draft(
        "Benchmark Customer",
        "MAIN",
        DocumentDates::new(date(1), date(10)),
        TaxRate::from_percent(12),
    );
    draft
        .add_line(DocumentLine::new(
            "SKU-BENCH",
            "Benchmark Widget",
            quantity,
            Money::from_cents(1000),
        ))
        .unwrap();
    draft
}

fn bench_emit_invoice(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/emit_invoice", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service =
                    BillingService::new(InMemoryEventStore::new(), stocked_engine(1, 100));
                service.emit_invoice(invoice_draft(10), date(15)).await.unwrap();
            });
        });
    });
}

fn bench_fifo_allocation_across_lots(c: &mut Criterion) {
    // Each iteration drains 50 one-unit lots in a single allocation.
    c.bench_function("domain/fifo_allocate_50_lots", |b| {
        b.iter(|| {
            let engine = stocked_engine(50, 1);
            let product = ProductId::new("SKU-BENCH");
            let warehouse = WarehouseId::new("MAIN");
            engine
                .allocate_outbound(&product, &warehouse, 50, AggregateId::new())
                .unwrap();
        });
    });
}

fn bench_invoice_reconstruction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = BillingService::new(InMemoryEventStore::new(), stocked_engine(50, 1));

    // One invoice whose emission touched 50 lots: 51 events to replay.
    let invoice_id = rt.block_on(async {
        let (invoice, _) = service.emit_invoice(invoice_draft(50), date(15)).await.unwrap();
        invoice.id().unwrap()
    });

    c.bench_function("domain/reconstruct_invoice_51_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let loaded = service.invoice(invoice_id).await.unwrap().unwrap();
                assert_eq!(loaded.movements().len(), 50);
            });
        });
    });
}

fn bench_emit_and_reload_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/emit_and_reload", |b| {
        b.iter(|| {
            rt.block_on(async {
                let service =
                    BillingService::new(InMemoryEventStore::new(), stocked_engine(1, 100));
                let (invoice, _) = service
                    .emit_invoice(invoice_draft(10), date(15))
                    .await
                    .unwrap();
                service.invoice(invoice.id().unwrap()).await.unwrap().unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_emit_invoice,
    bench_fifo_allocation_across_lots,
    bench_invoice_reconstruction,
    bench_emit_and_reload_cycle,
);
criterion_main!(benches);
