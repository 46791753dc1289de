use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use lotkeeper_core::{FixedClock, LotId, MaterialId, UserId, WarehouseId};
use lotkeeper_events::InMemoryEventBus;
use lotkeeper_infra::{InMemoryLotStore, LotReceipt, LotService};
use lotkeeper_lots::{LineageGraph, LineageLink, LinkKind, LotHistoryEntry};

type BenchService = LotService<InMemoryLotStore, InMemoryEventBus<LotHistoryEntry>>;

fn service() -> BenchService {
    let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or_default();
    LotService::new(InMemoryLotStore::new(), InMemoryEventBus::new())
        .with_clock(Arc::new(FixedClock::on(today)))
}

fn receipt(
    material_id: MaterialId,
    warehouse_id: WarehouseId,
    quantity: Decimal,
    expiry_days: u64,
) -> LotReceipt {
    let base = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default();
    LotReceipt {
        material_id,
        warehouse_id,
        quantity,
        manufacture_date: Some(base),
        expiry_date: base.checked_add_days(chrono::Days::new(expiry_days)),
        note: None,
    }
}

fn bench_split_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_latency");
    group.sample_size(500);

    group.bench_function("split_one_unit_off_large_lot", |b| {
        let svc = service();
        let actor = UserId::new();
        let lot = svc
            .receive_lot(actor, receipt(MaterialId::new(), WarehouseId::new(), dec!(1000000000), 365))
            .unwrap();

        b.iter(|| {
            let children = svc
                .split_lot(actor, lot.id, vec![dec!(1)], None)
                .unwrap();
            black_box(children);
        });
    });

    group.finish();
}

fn bench_merge_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_width");

    for sources in [2usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*sources as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sources), sources, |b, &sources| {
            b.iter_batched(
                || {
                    let svc = service();
                    let actor = UserId::new();
                    let material = MaterialId::new();
                    let warehouse = WarehouseId::new();
                    let ids: Vec<LotId> = (0..sources)
                        .map(|i| {
                            svc.receive_lot(actor, receipt(material, warehouse, dec!(5), i as u64))
                                .unwrap()
                                .id
                        })
                        .collect();
                    (svc, actor, ids)
                },
                |(svc, actor, ids)| black_box(svc.merge_lots(actor, ids, None).unwrap()),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_lineage_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("lineage_walk");

    for depth in [10u64, 100, 1000].iter() {
        // Chain 1 <- 2 <- ... <- depth, alternating split and merge links.
        let links: Vec<LineageLink> = (1..*depth)
            .map(|n| LineageLink {
                parent: LotId::new(n),
                child: LotId::new(n + 1),
                kind: if n % 2 == 0 { LinkKind::Merge } else { LinkKind::Split },
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            b.iter(|| {
                let graph = LineageGraph::new(links.iter().copied());
                black_box(graph.ancestors(LotId::new(depth)))
            });
        });
    }

    group.finish();
}

fn bench_expiry_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_expiring");

    for lots in [100u64, 1000].iter() {
        let svc = service();
        let actor = UserId::new();
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();
        for i in 0..*lots {
            svc.receive_lot(actor, receipt(material, warehouse, dec!(1), i % 90))
                .unwrap();
        }

        group.throughput(Throughput::Elements(*lots));
        group.bench_with_input(BenchmarkId::from_parameter(lots), lots, |b, _| {
            b.iter(|| black_box(svc.list_expiring(actor, Some(warehouse)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_split_latency,
    bench_merge_width,
    bench_lineage_walk,
    bench_expiry_listing
);
criterion_main!(benches);
