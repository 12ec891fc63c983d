// ============================================================================
// Retirement Soak
// ============================================================================
//
// Drives a RetirementManager the way the entity pipeline does: one worker per
// concurrency key, roots that fan out a child invocation to a higher key and
// defer their own retirement to it, and occasional holds. Checks that every
// message retires exactly once and that each resolved batch is ordered.
//
// ============================================================================

use crate::config::RetirementConfig;
use crate::core::{ConcurrencyKey, Result as RetirementResult};
use crate::retirement::{RetireFuture, Retiree, RetirementManager, RetirementStats, retired};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, info_span, warn};

pub struct SoakConfig {
    pub duration_secs: u64,
    pub keys: usize,
    /// Percentage of root messages that fan out to another key
    pub defer_ratio: u8,
    /// Percentage of messages held across their completion
    pub hold_ratio: u8,
    pub seed: u64,
    pub retirement: RetirementConfig,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            duration_secs: 5,
            keys: 4,
            defer_ratio: 20,
            hold_ratio: 5,
            seed: 0x9e3779b97f4a7c15,
            retirement: RetirementConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoakReport {
    pub elapsed: Duration,
    pub registered: u64,
    pub retired: u64,
    pub deferred: u64,
    pub held: u64,
    pub duplicate_retirements: u64,
    pub order_violations: u64,
    pub latency_us_p50: u64,
    pub latency_us_p95: u64,
    pub latency_us_p99: u64,
    pub stats: RetirementStats,
}

impl SoakReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_retirements == 0
            && self.order_violations == 0
            && self.retired == self.registered
            && self.stats.is_drained()
    }

    pub fn print(&self) {
        let elapsed = self.elapsed.as_secs_f64().max(0.001);
        println!("retirement soak results:");
        println!("  duration_s: {:.2}", elapsed);
        println!("  registered: {}", self.registered);
        println!("  retired: {}", self.retired);
        println!("  deferred: {}", self.deferred);
        println!("  held: {}", self.held);
        println!("  duplicate_retirements: {}", self.duplicate_retirements);
        println!("  order_violations: {}", self.order_violations);
        println!("  retired_per_s: {:.2}", self.retired as f64 / elapsed);
        println!("  complete_latency_us_p50: {}", self.latency_us_p50);
        println!("  complete_latency_us_p95: {}", self.latency_us_p95);
        println!("  complete_latency_us_p99: {}", self.latency_us_p99);
        println!("  pending_after_drain: {}", self.stats.pending);
    }
}

/// Invocation handed to a key's worker.
#[derive(Debug, Clone, Copy)]
struct Job {
    message: u64,
    parent: Option<u64>,
}

struct SoakRetiree {
    message: u64,
    key: ConcurrencyKey,
    key_order: u64,
    parent: Option<u64>,
    tally: Arc<Tally>,
}

impl Retiree for SoakRetiree {
    fn retire(self) -> RetireFuture {
        self.tally.record(self.message);
        retired()
    }
}

#[derive(Default)]
struct Tally {
    retired: Mutex<HashSet<u64>>,
    retired_count: AtomicU64,
    duplicates: AtomicU64,
    order_violations: AtomicU64,
}

impl Tally {
    fn record(&self, message: u64) {
        let fresh = match self.retired.lock() {
            Ok(mut retired) => retired.insert(message),
            Err(poisoned) => poisoned.into_inner().insert(message),
        };
        if fresh {
            self.retired_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Within one batch: per-key FIFO, and a child ahead of its parent.
    fn check_batch(&self, batch: &[SoakRetiree]) {
        let position: HashMap<u64, usize> = batch
            .iter()
            .enumerate()
            .map(|(idx, retiree)| (retiree.message, idx))
            .collect();
        let mut last_in_key: HashMap<ConcurrencyKey, u64> = HashMap::new();

        for (idx, retiree) in batch.iter().enumerate() {
            let parent_idx = retiree.parent.and_then(|parent| position.get(&parent));
            let parent_first = parent_idx.is_some_and(|parent_idx| *parent_idx < idx);
            let out_of_key_order = last_in_key
                .get(&retiree.key)
                .is_some_and(|previous| *previous > retiree.key_order);
            // A child run on its parent's key jumps ahead of that parent.
            if parent_idx.is_none() {
                last_in_key.insert(retiree.key, retiree.key_order);
            }

            if out_of_key_order || parent_first {
                warn!(message = retiree.message, key = %retiree.key, "batch out of order");
                self.order_violations.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

struct SoakContext {
    manager: RetirementManager<u64, SoakRetiree>,
    tally: Arc<Tally>,
    inboxes: Vec<mpsc::UnboundedSender<Job>>,
    next_message: AtomicU64,
    in_flight: AtomicU64,
    registered: AtomicU64,
    deferred: AtomicU64,
    held: AtomicU64,
    keys: usize,
    defer_ratio: u8,
    hold_ratio: u8,
    deadline: Instant,
}

impl SoakContext {
    fn next_message(&self) -> u64 {
        self.next_message.fetch_add(1, Ordering::Relaxed)
    }
}

pub async fn run_soak(config: SoakConfig) -> Result<SoakReport, Box<dyn Error + Send + Sync>> {
    if config.keys == 0 {
        return Err("soak needs at least one concurrency key".into());
    }

    let manager = RetirementManager::with_config(config.retirement.clone())?;
    let mut receivers = Vec::with_capacity(config.keys);
    let mut inboxes = Vec::with_capacity(config.keys);
    for _ in 0..config.keys {
        let (tx, rx) = mpsc::unbounded_channel();
        inboxes.push(tx);
        receivers.push(rx);
    }

    let start = Instant::now();
    let ctx = Arc::new(SoakContext {
        manager,
        tally: Arc::new(Tally::default()),
        inboxes,
        next_message: AtomicU64::new(1),
        in_flight: AtomicU64::new(0),
        registered: AtomicU64::new(0),
        deferred: AtomicU64::new(0),
        held: AtomicU64::new(0),
        keys: config.keys,
        defer_ratio: config.defer_ratio,
        hold_ratio: config.hold_ratio,
        deadline: start + Duration::from_secs(config.duration_secs),
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let span = info_span!("soak", keys = config.keys, duration_secs = config.duration_secs);
    let mut handles = Vec::with_capacity(config.keys);
    for (key_index, inbox) in receivers.into_iter().enumerate() {
        let ctx = ctx.clone();
        let shutdown = shutdown_rx.clone();
        let rng = Lcg64::new(config.seed ^ key_index as u64);
        let worker = run_worker(ctx, key_index, inbox, shutdown, rng);
        handles.push(tokio::spawn(worker.instrument(span.clone())));
    }

    tokio::time::sleep_until(ctx.deadline.into()).await;
    while ctx.in_flight.load(Ordering::SeqCst) > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let _ = shutdown_tx.send(true);

    let mut latencies = Vec::new();
    for handle in handles {
        let mut worker_latencies = handle.await??;
        latencies.append(&mut worker_latencies);
    }
    latencies.sort_unstable();

    let stats = ctx.manager.stats()?;
    let report = SoakReport {
        elapsed: start.elapsed(),
        registered: ctx.registered.load(Ordering::Relaxed),
        retired: ctx.tally.retired_count.load(Ordering::Relaxed),
        deferred: ctx.deferred.load(Ordering::Relaxed),
        held: ctx.held.load(Ordering::Relaxed),
        duplicate_retirements: ctx.tally.duplicates.load(Ordering::Relaxed),
        order_violations: ctx.tally.order_violations.load(Ordering::Relaxed),
        latency_us_p50: percentile(&latencies, 0.50),
        latency_us_p95: percentile(&latencies, 0.95),
        latency_us_p99: percentile(&latencies, 0.99),
        stats,
    };
    info!(
        registered = report.registered,
        retired = report.retired,
        clean = report.is_clean(),
        "soak finished"
    );
    Ok(report)
}

async fn run_worker(
    ctx: Arc<SoakContext>,
    key_index: usize,
    mut inbox: mpsc::UnboundedReceiver<Job>,
    mut shutdown: watch::Receiver<bool>,
    mut rng: Lcg64,
) -> RetirementResult<Vec<u64>> {
    let key = ConcurrencyKey::new(key_index as i32 + 1);
    let mut key_order = 0u64;
    let mut latencies = Vec::new();
    let mut leftover: Option<Job> = None;

    loop {
        let job = match leftover.take().map(Ok).unwrap_or_else(|| inbox.try_recv()) {
            Ok(job) => job,
            Err(_) if Instant::now() < ctx.deadline => {
                ctx.in_flight.fetch_add(1, Ordering::SeqCst);
                Job {
                    message: ctx.next_message(),
                    parent: None,
                }
            }
            Err(_) => {
                tokio::select! {
                    job = inbox.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        };

        key_order += 1;
        let (latency, child) = process(&ctx, key, key_index, key_order, job, &mut rng).await?;
        leftover = child;
        latencies.push(latency);
        ctx.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    debug!(%key, processed = key_order, "soak worker stopped");
    Ok(latencies)
}

async fn process(
    ctx: &SoakContext,
    key: ConcurrencyKey,
    key_index: usize,
    key_order: u64,
    job: Job,
    rng: &mut Lcg64,
) -> RetirementResult<(u64, Option<Job>)> {
    let mut leftover = None;
    let retiree = SoakRetiree {
        message: job.message,
        key,
        key_order,
        parent: job.parent,
        tally: ctx.tally.clone(),
    };
    ctx.manager.register(job.message, key, retiree)?;
    ctx.registered.fetch_add(1, Ordering::Relaxed);

    // Fan-out only targets higher keys: a root waiting on a child queued
    // behind a root that waits back on this key would never retire.
    let higher_keys = ctx.keys - key_index - 1;
    if job.parent.is_none() && higher_keys > 0 && roll(rng) < ctx.defer_ratio {
        let child = Job {
            message: ctx.next_message(),
            parent: Some(job.message),
        };
        ctx.manager.defer(job.message, child.message)?;
        ctx.deferred.fetch_add(1, Ordering::Relaxed);
        ctx.in_flight.fetch_add(1, Ordering::SeqCst);

        let other = key_index + 1 + (rng.next_u64() as usize % higher_keys);
        if let Err(mpsc::error::SendError(child)) = ctx.inboxes[other].send(child) {
            // The other worker already stopped; run the child on this key.
            leftover = Some(child);
        }
    }

    // Execution of the invocation itself.
    tokio::task::yield_now().await;

    let held = roll(rng) < ctx.hold_ratio;
    if held {
        ctx.manager.hold(&job.message)?;
        ctx.held.fetch_add(1, Ordering::Relaxed);
    }

    let started = Instant::now();
    let mut batch = ctx.manager.complete(&job.message)?;
    if held && ctx.manager.release(&job.message)? {
        batch.extend(ctx.manager.complete(&job.message)?);
    }
    let latency = started.elapsed().as_micros() as u64;

    ctx.tally.check_batch(&batch);
    for retiree in batch {
        retiree.retire().await;
    }
    Ok((latency, leftover))
}

fn roll(rng: &mut Lcg64) -> u8 {
    (rng.next_u64() % 100) as u8
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx]
}

struct Lcg64 {
    state: u64,
}

impl Lcg64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        // High bits carry the period; the low bits of an LCG cycle quickly.
        self.state >> 33
    }
}
