use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use simple_appointments::appointment::Appointment;
use simple_appointments::catalog::InMemoryCatalog;
use simple_appointments::config::SchedulerConfig;
use simple_appointments::engine::Scheduler;
use simple_appointments::model::*;
use simple_appointments::notify::NotifyHub;

/// 2025-01-01T00:00:00Z
const EPOCH: Ms = 1_735_689_600_000;

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

struct Setup {
    scheduler: Arc<Scheduler>,
    /// 30 minutes
    short: Ulid,
    /// 1 hour
    long: Ulid,
}

async fn setup(name: &str) -> Setup {
    let dir = std::env::temp_dir().join(format!("appointments_bench_{}", Ulid::new()));
    let short = Activity::new(Ulid::new(), "short", 30 * MINUTE, Money::new(25, 0)).expect("activity");
    let long = Activity::new(Ulid::new(), "long", HOUR, Money::new(50, 0)).expect("activity");
    let catalog: InMemoryCatalog = [short.clone(), long.clone()].into_iter().collect();

    let config = SchedulerConfig::with_wal_path(dir.join(format!("{name}.wal")));
    let scheduler = Scheduler::open(&config, Arc::new(catalog), Arc::new(NotifyHub::new()))
        .await
        .expect("open scheduler");
    Setup {
        scheduler: Arc::new(scheduler),
        short: short.id,
        long: long.id,
    }
}

async fn phase1_sequential() {
    let s = setup("sequential").await;
    let provider = Ulid::new();
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let mut appt = Appointment::new(provider, Ulid::new(), vec![s.long], EPOCH + (i as Ms) * HOUR);
        let t = Instant::now();
        s.scheduler.book(&mut appt).await.expect("book");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("book latency", &mut latencies);
}

async fn phase2_concurrent_providers() {
    let s = setup("concurrent").await;
    let n_tasks = 10;
    let n_per_task = 200;
    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let scheduler = s.scheduler.clone();
        let activities = vec![s.short, s.long];
        handles.push(tokio::spawn(async move {
            let provider = Ulid::new();
            let mut latencies = Vec::with_capacity(n_per_task);
            for i in 0..n_per_task {
                let start = EPOCH + (i as Ms) * 2 * HOUR;
                let mut appt = Appointment::new(provider, Ulid::new(), activities.clone(), start);
                let t = Instant::now();
                scheduler.book(&mut appt).await.expect("book");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.expect("task panicked"));
    }
    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {total} bookings across {n_tasks} providers in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    print_latency("book latency", &mut all);
}

async fn phase3_contention() {
    let s = setup("contention").await;
    let provider = Ulid::new();
    let n_tasks = 50;
    let slots = 100;
    let success = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    // Every task races for the same 100 hourly slots
    for _ in 0..n_tasks {
        let scheduler = s.scheduler.clone();
        let activity = s.long;
        let success = success.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..slots {
                let mut appt = Appointment::new(provider, Ulid::new(), vec![activity], EPOCH + (i as Ms) * HOUR);
                match scheduler.book(&mut appt).await {
                    Ok(_) => success.fetch_add(1, Ordering::Relaxed),
                    Err(e) if e.is_conflict() => conflicts.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.expect("task panicked");
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    let rejected = conflicts.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks x {slots} slots: {ok} booked, {rejected} conflicts in {:.2}s",
        elapsed.as_secs_f64()
    );
    assert_eq!(ok, slots, "each slot must be booked exactly once");
}

async fn phase4_read_under_load() {
    let s = setup("read_under_load").await;
    let provider = Ulid::new();
    for i in 0..500 {
        let mut appt = Appointment::new(provider, Ulid::new(), vec![s.short], EPOCH + (i as Ms) * HOUR);
        s.scheduler.book(&mut appt).await.expect("seed booking");
    }

    let writer = {
        let scheduler = s.scheduler.clone();
        let activity = s.short;
        tokio::spawn(async move {
            for i in 0..500 {
                let start = EPOCH + (i as Ms) * HOUR + 30 * MINUTE;
                let mut appt = Appointment::new(provider, Ulid::new(), vec![activity], start);
                let _ = scheduler.book(&mut appt).await;
            }
        })
    };

    let mut latencies = Vec::with_capacity(1000);
    for i in 0..1000 {
        let day = EPOCH + ((i % 20) as Ms) * DAY;
        let t = Instant::now();
        s.scheduler
            .free_spans(provider, Span::new(day, day + DAY), Some(30 * MINUTE))
            .await
            .expect("free spans");
        latencies.push(t.elapsed());
    }
    writer.await.expect("writer panicked");
    print_latency("free_spans latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== appointments stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent booking across providers");
    phase2_concurrent_providers().await;

    println!("\n[phase 3] contention on one provider");
    phase3_contention().await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load().await;

    println!("\n=== benchmark complete ===");
}
