use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use saber_catalog::{Item, ItemDraft, Operation, transition};
use saber_core::{AccountId, ItemId, SystemClock};
use saber_events::NoopNotifier;
use saber_rental::{InMemoryRentalStore, RentalConfig, RentalOrchestrator};

type Rentals = RentalOrchestrator<InMemoryRentalStore, NoopNotifier, SystemClock>;

fn setup(grant: u64) -> (Rentals, ItemId, AccountId) {
    let rentals = RentalOrchestrator::from_config(
        InMemoryRentalStore::new(),
        NoopNotifier,
        SystemClock,
        &RentalConfig::default(),
    )
    .unwrap();
    let owner = rentals.open_account("owner", 0).unwrap().id_typed();
    let reader = rentals.open_account("reader", grant).unwrap().id_typed();
    let item = rentals
        .deposit(ItemDraft::new("Dom Casmurro", "Machado de Assis"), owner)
        .unwrap()
        .item
        .id_typed();
    (rentals, item, reader)
}

fn bench_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_machine");
    let draft = ItemDraft::new("Quincas Borba", "Machado de Assis")
        .validate()
        .unwrap();
    let item = Item::from_draft(ItemId::new(), draft, AccountId::new(), None, Utc::now());
    let actor = AccountId::new();

    group.bench_function("decide_rent", |b| {
        b.iter(|| black_box(transition(black_box(&item), Operation::Rent, actor)).unwrap());
    });

    group.finish();
}

fn bench_rent_return_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("rent_return_cycle");
    group.throughput(Throughput::Elements(2));

    group.bench_function("rent_then_return", |b| {
        let (rentals, item, reader) = setup(u64::MAX / 2);
        b.iter(|| {
            black_box(rentals.rent(item, reader).unwrap());
            black_box(rentals.return_item(item, reader).unwrap());
        });
    });

    group.finish();
}

fn bench_audit_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_replay");

    for cycles in [10u64, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("audit_after_cycles", cycles),
            cycles,
            |b, &cycles| {
                let (rentals, item, reader) = setup(cycles * 7);
                for _ in 0..cycles {
                    rentals.rent(item, reader).unwrap();
                    rentals.return_item(item, reader).unwrap();
                }
                b.iter(|| black_box(rentals.audit().unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_state_machine,
    bench_rent_return_cycle,
    bench_audit_replay
);
criterion_main!(benches);
