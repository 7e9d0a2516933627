use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use slotd::config::SchedulerConfig;
use slotd::engine::Engine;
use slotd::model::*;
use slotd::store::LocalStore;

const HOUR: i64 = 60 * MINUTE_MS;

fn epoch_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
}

/// 10:00 on the `n`th day after the bench epoch.
fn morning(n: u64) -> Ms {
    let date = epoch_day() + Days::new(n);
    at(date, NaiveTime::from_hms_opt(10, 0, 0).unwrap())
}

fn journal_engine(name: &str) -> (Arc<Engine>, Arc<LocalStore>) {
    let dir = std::env::temp_dir().join(format!("slotd_bench_{name}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = SchedulerConfig::default();
    let store = Arc::new(LocalStore::open(&dir.join("bookings.wal"), Some(config.buffer_ms)).unwrap());
    (Arc::new(Engine::new(store.clone(), config)), store)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential() {
    let (engine, _store) = journal_engine("seq");
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = morning(i as u64);
        let t = Instant::now();
        engine.create_booking("R1", s, s + HOUR, "bench").await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent() {
    let (engine, _store) = journal_engine("concurrent");
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let engine = engine.clone();
        let resource = format!("R{i}");
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                let s = morning(j as u64);
                engine.create_booking(&resource, s, s + HOUR, "bench").await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many tasks racing for the same windows on one resource.
async fn phase3_contention() {
    let (engine, _store) = journal_engine("contention");
    let n_tasks = 20;
    let attempts = 100;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..attempts {
                let s = morning(j as u64) + (t % 4) * 15 * MINUTE_MS;
                match engine.create_booking("shared", s, s + 30 * MINUTE_MS, "bench").await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(_) => lost.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    println!(
        "  {} attempts in {:.2}s: {} booked, {} rejected",
        n_tasks * attempts,
        start.elapsed().as_secs_f64(),
        won.load(Ordering::Relaxed),
        lost.load(Ordering::Relaxed),
    );
}

async fn phase4_slots_under_load() {
    let (engine, _store) = journal_engine("slots");
    for i in 0..200u64 {
        let s = morning(i);
        engine.create_booking("R1", s, s + HOUR, "bench").await.unwrap();
        engine
            .create_booking("R1", s + 4 * HOUR, s + 5 * HOUR, "bench")
            .await
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5u64 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let resource = format!("W{w}");
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let s = morning(i);
                let _ = engine.create_booking(&resource, s, s + HOUR, "bench").await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for k in 0..reads_per_reader {
                let date = epoch_day() + Days::new(((r * reads_per_reader + k) % 200) as u64);
                let t = Instant::now();
                engine.available_slots("R1", date, Some(30)).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("available_slots", &mut all_latencies);
}

async fn phase5_compaction() {
    let (engine, store) = journal_engine("compact");
    for i in 0..1000u64 {
        let s = morning(i);
        let b = engine.create_booking("R1", s, s + HOUR, "bench").await.unwrap();
        if i % 2 == 0 {
            engine.cancel_booking_at(b.id, 0).await.unwrap();
        }
    }
    let pending = store.appends_since_compact().await;
    let t = Instant::now();
    store.compact().await.unwrap();
    println!(
        "  compacted {pending} events into {} bookings in {:.2}ms",
        store.booking_count(),
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    println!("=== slotd stress benchmark ===\n");

    println!("[phase 1] sequential write throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] contended writes on one resource");
    phase3_contention().await;

    println!("\n[phase 4] slot query latency under write load");
    phase4_slots_under_load().await;

    println!("\n[phase 5] journal compaction");
    phase5_compaction().await;

    println!("\n=== done ===");
}
