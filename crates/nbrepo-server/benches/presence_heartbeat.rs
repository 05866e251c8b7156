//! Presence Heartbeat Benchmark
//!
//! Measures the in-memory presence table under the heartbeat path:
//! - One heartbeat against a notebook with N live editors
//! - A read of active editors across many tracked notebooks

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nbrepo_core::Username;
use nbrepo_server::{InMemoryPresence, PresenceMonitor};
use tokio::runtime::Runtime;

fn user(i: usize) -> Username {
    Username::parse(&format!("user{i}")).unwrap()
}

fn bench_heartbeat_scaling(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("heartbeat");

    for editors in [1usize, 10, 100, 1_000] {
        let presence = InMemoryPresence::new(Duration::seconds(120));
        let now = Utc::now();
        rt.block_on(async {
            for i in 0..editors {
                presence.heartbeat("alice/proj.ipynb", &user(i), now).await;
            }
        });
        let caller = user(0);

        group.throughput(Throughput::Elements(editors as u64));
        group.bench_with_input(BenchmarkId::new("editors", editors), &editors, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    black_box(presence.heartbeat("alice/proj.ipynb", &caller, now).await)
                })
            })
        });
    }
    group.finish();
}

fn bench_active_editors_many_keys(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let presence = InMemoryPresence::new(Duration::seconds(120));
    let now = Utc::now();

    rt.block_on(async {
        for key in 0..10_000 {
            let path = format!("owner{}/nb{}.ipynb", key % 100, key);
            presence.heartbeat(&path, &user(key % 7), now).await;
        }
    });

    c.bench_function("active_editors_10k_keys", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(presence.active_editors("owner42/nb4242.ipynb", now).await)
            })
        })
    });
}

criterion_group!(benches, bench_heartbeat_scaling, bench_active_editors_many_keys);
criterion_main!(benches);
