use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, CommandHandler, InventoryService, ProductId, RegisterStockItem, StockItem,
};
use event_store::InMemoryEventStore;

fn registered_item() -> StockItem {
    let item = StockItem::default();
    item.with_events(
        &item
            .register(RegisterStockItem::new("SKU-BENCH", "Bench", 1_000, 10, 10_000))
            .unwrap(),
    )
}

fn bench_reserve_decision(c: &mut Criterion) {
    let item = registered_item();

    c.bench_function("ledger/reserve_decide_and_apply", |b| {
        b.iter(|| {
            let events = item.reserve(3).unwrap();
            item.with_events(&events)
        });
    });
}

fn bench_reserve_release_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let service = InventoryService::new(store.clone());
    let product = ProductId::new("SKU-BENCH");
    rt.block_on(async {
        service
            .register(RegisterStockItem::new("SKU-BENCH", "Bench", 1_000, 10, 10_000))
            .await
            .unwrap()
    });
    let handler = CommandHandler::<_, StockItem>::new(store);
    let id = StockItem::stream_id(&product);

    c.bench_function("ledger/reserve_release_persisted", |b| {
        b.iter(|| {
            rt.block_on(async {
                handler
                    .execute_existing(id, |item| item.reserve(1))
                    .await
                    .unwrap();
                handler
                    .execute_existing(id, |item| item.release(1))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let handler = CommandHandler::<_, StockItem>::new(store.clone());
    let service = InventoryService::new(store);
    let product = ProductId::new("SKU-REPLAY");
    let id = StockItem::stream_id(&product);
    rt.block_on(async {
        service
            .register(RegisterStockItem::new("SKU-REPLAY", "Replay", 500, 10, 1_000))
            .await
            .unwrap();
        for _ in 0..100 {
            handler
                .execute_existing(id, |item| item.reserve(1))
                .await
                .unwrap();
            handler
                .execute_existing(id, |item| item.release(1))
                .await
                .unwrap();
        }
    });

    c.bench_function("ledger/load_201_events", |b| {
        b.iter(|| rt.block_on(async { handler.load(id).await.unwrap() }));
    });
}

criterion_group!(
    benches,
    bench_reserve_decision,
    bench_reserve_release_cycle,
    bench_replay,
);
criterion_main!(benches);
