//! The concurrent dispatch engine.
//!
//! A bounded producer/consumer pipeline: the feeder pushes filtered
//! candidate names into the input queue, a fixed pool of workers (one task
//! per server replica) probes them over persistent sessions, and the sink
//! drains confirmed hits to the output collaborator. The two queues are the
//! only coupling between the stages; backpressure on either side suspends
//! the producer or the workers.

use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::candidates::is_valid_candidate;
use crate::session::{is_hit, SessionFactory};

/// Capacity of the input and output queues.
pub const QUEUE_DEPTH: usize = 128;

/// Feeder progress is reported once per this many input lines.
const PROGRESS_BATCH: u64 = 500;

/// Interval between run statistics log lines.
const STATS_PERIOD: Duration = Duration::from_secs(2);

pub struct PipelineConfig {
    /// Selected servers, one worker group each.
    pub servers: Vec<String>,
    /// Sessions per server.
    pub parallel: usize,
    /// Minimum spacing between probes across the whole pool. `None`
    /// disables pacing.
    pub throttle: Option<Duration>,
    /// Probes per session before an evasive reconnect. `0` disables.
    pub session_quota: u64,
}

#[derive(Debug)]
pub struct RunReport {
    pub fed: u64,
    pub dropped: u64,
    pub probed: u64,
    pub hits: u64,
    /// Why no further sessions could be opened, if the run was cut short.
    pub abort: Option<String>,
}

/// Process-wide abort state. Set at most once; the first connect failure
/// wins and later attempts are no-ops. Read only at worker-loop entry, so
/// in-flight probes on other sessions always complete.
pub struct AbortFlag {
    reason: Mutex<Option<String>>,
}

impl AbortFlag {
    fn new() -> Self {
        Self {
            reason: Mutex::new(None),
        }
    }

    pub fn trip(&self, reason: String) {
        let mut guard = self.reason.lock();
        if guard.is_none() {
            *guard = Some(reason);
        }
    }

    pub fn tripped(&self) -> bool {
        self.reason.lock().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

#[derive(Default)]
struct Stats {
    fed: AtomicU64,
    dropped: AtomicU64,
    probed: AtomicU64,
    hits: AtomicU64,
}

impl Stats {
    fn render(&self) -> String {
        format!(
            "fed: {} dropped: {} probed: {} hits: {}",
            self.fed.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.probed.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
        )
    }
}

type SharedReceiver = Arc<AsyncMutex<Receiver<String>>>;
type Pacer = Arc<AsyncMutex<Interval>>;

/// Run the pipeline to completion and return the tally.
///
/// Shutdown sequencing: workers are joined first; the output queue closes
/// when the last worker drops its sender, so the sink can never observe a
/// write after close. The input receiver is dropped only after the workers
/// are gone, which unblocks a feeder left suspended by an aborted run.
pub async fn run(
    cfg: PipelineConfig,
    factory: Arc<dyn SessionFactory>,
    input: Box<dyn Iterator<Item = String> + Send>,
    output: Box<dyn Write + Send>,
) -> Result<RunReport> {
    let (in_tx, in_rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    let (out_tx, out_rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    let in_rx: SharedReceiver = Arc::new(AsyncMutex::new(in_rx));

    let abort = Arc::new(AbortFlag::new());
    let stats = Arc::new(Stats::default());
    let pacer: Option<Pacer> = cfg.throttle.map(|period| {
        let mut ticker = interval(period);
        // The throttle is a floor on probe spacing. A stall longer than the
        // period (slow server, output backpressure) must not bank ticks and
        // release them as a burst afterwards.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Arc::new(AsyncMutex::new(ticker))
    });

    let mut workers = Vec::with_capacity(cfg.servers.len() * cfg.parallel);
    for server in &cfg.servers {
        for _ in 0..cfg.parallel {
            workers.push(tokio::spawn(worker(
                server.clone(),
                factory.clone(),
                abort.clone(),
                in_rx.clone(),
                out_tx.clone(),
                pacer.clone(),
                cfg.session_quota,
                stats.clone(),
            )));
        }
    }
    // Workers hold the only remaining output senders from here on.
    drop(out_tx);

    let feeder = tokio::spawn(feed(input, in_tx, stats.clone()));
    let sink = tokio::spawn(sink(out_rx, output));
    let ticker = tokio::spawn({
        let stats = stats.clone();
        async move {
            loop {
                tokio::time::sleep(STATS_PERIOD).await;
                info!("{}", stats.render());
            }
        }
    });

    for handle in workers {
        handle.await?;
    }
    // All output senders are gone now; the sink drains and terminates. If
    // the run aborted with the input queue full, dropping the receiver
    // releases the feeder.
    drop(in_rx);
    feeder.await?;
    sink.await?;
    ticker.abort();

    Ok(RunReport {
        fed: stats.fed.load(Ordering::Relaxed),
        dropped: stats.dropped.load(Ordering::Relaxed),
        probed: stats.probed.load(Ordering::Relaxed),
        hits: stats.hits.load(Ordering::Relaxed),
        abort: abort.reason(),
    })
}

/// Read candidates from the source, filter them, and push the rest into the
/// input queue. Closing the queue (sender drop) happens exactly once, on
/// source exhaustion or when the receiving side has gone away.
async fn feed(
    input: Box<dyn Iterator<Item = String> + Send>,
    tx: Sender<String>,
    stats: Arc<Stats>,
) {
    let mut lines: u64 = 0;
    for name in input {
        lines += 1;
        if lines % PROGRESS_BATCH == 0 {
            debug!(lines, "candidates read");
        }
        if name.is_empty() {
            continue;
        }
        if !is_valid_candidate(&name) {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        if tx.send(name).await.is_err() {
            // No workers left to take candidates; the run was cut short.
            break;
        }
        stats.fed.fetch_add(1, Ordering::Relaxed);
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker(
    server: String,
    factory: Arc<dyn SessionFactory>,
    abort: Arc<AbortFlag>,
    in_rx: SharedReceiver,
    out_tx: Sender<String>,
    pacer: Option<Pacer>,
    quota: u64,
    stats: Arc<Stats>,
) {
    'reconnect: loop {
        if abort.tripped() {
            return;
        }

        let mut session = match factory.connect(&server).await {
            Ok(session) => session,
            Err(err) => {
                warn!(server = %server, "session establishment failed: {err:#}");
                abort.trip(format!("{server}: {err:#}"));
                return;
            }
        };

        let mut requests: u64 = 0;
        loop {
            let candidate = { in_rx.lock().await.recv().await };
            let Some(name) = candidate else {
                // Input queue closed and drained.
                session.close().await;
                return;
            };

            if let Some(pacer) = &pacer {
                pacer.lock().await.tick().await;
            }

            match session.probe(Some(&name)).await {
                Ok(Some(payload)) if is_hit(&payload) => {
                    stats.hits.fetch_add(1, Ordering::Relaxed);
                    if out_tx.send(name).await.is_err() {
                        session.close().await;
                        return;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(server = %server, candidate = %name, "probe failed: {err:#}");
                }
            }
            stats.probed.fetch_add(1, Ordering::Relaxed);

            requests += 1;
            if quota != 0 && requests == quota {
                // Evasive reconnect, not an error path. Re-entering the
                // outer loop re-checks the abort flag before dialing.
                session.close().await;
                continue 'reconnect;
            }
        }
    }
}

/// Write hits one per line in arrival order.
async fn sink(mut rx: Receiver<String>, output: Box<dyn Write + Send>) {
    let mut out = BufWriter::new(output);
    while let Some(name) = rx.recv().await {
        writeln!(out, "{name}").ok();
        // Hits are rare; surface them as they arrive.
        out.flush().ok();
    }
    out.flush().ok();
}
