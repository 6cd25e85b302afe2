use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use adcensus::select::{self, Strategy};
use adcensus::session::{ProbeSession, SessionFactory};

/// Benchmark stub: per-server probe delay, or no connectivity at all.
struct BenchFactory {
    delays: HashMap<String, Duration>,
    connects: AtomicUsize,
}

impl BenchFactory {
    fn new(delays: &[(&str, Duration)]) -> Arc<Self> {
        Arc::new(Self {
            delays: delays
                .iter()
                .map(|(name, d)| (name.to_string(), *d))
                .collect(),
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionFactory for BenchFactory {
    async fn connect(&self, server: &str) -> anyhow::Result<Box<dyn ProbeSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.delays.get(server) {
            Some(delay) => Ok(Box::new(BenchSession { delay: *delay })),
            None => anyhow::bail!("no route to {server}"),
        }
    }
}

struct BenchSession {
    delay: Duration,
}

#[async_trait]
impl ProbeSession for BenchSession {
    async fn probe(&mut self, _candidate: Option<&str>) -> anyhow::Result<Option<Vec<u8>>> {
        if self.delay == Duration::MAX {
            anyhow::bail!("search failed");
        }
        tokio::time::sleep(self.delay).await;
        Ok(Some(vec![0x17, 0x00, 0x01]))
    }

    async fn close(&mut self) {}
}

fn servers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn small_discovered_set_is_returned_unchanged() {
    let factory = BenchFactory::new(&[]);
    let discovered = servers(&["dc1", "dc2", "dc3"]);

    let chosen = select::choose_servers(
        discovered.clone(),
        8,
        Strategy::Fastest,
        factory.clone(),
        Duration::from_millis(100),
    )
    .await;

    assert_eq!(chosen, discovered);
    // The strategy was never invoked, so no benchmark session was opened.
    assert_eq!(factory.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_server_passes_through() {
    let factory = BenchFactory::new(&[]);
    let chosen = select::choose_servers(
        servers(&["dc1"]),
        8,
        Strategy::Random,
        factory,
        Duration::from_millis(100),
    )
    .await;
    assert_eq!(chosen, ["dc1"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn fastest_ranks_by_completed_iterations() {
    let factory = BenchFactory::new(&[
        ("fast", Duration::from_millis(2)),
        ("slow", Duration::from_millis(20)),
        ("flaky", Duration::MAX), // probe errors out immediately
        // "dead" is absent: connect is refused
    ]);

    let chosen = select::choose_servers(
        servers(&["dead", "flaky", "slow", "fast"]),
        2,
        Strategy::Fastest,
        factory,
        Duration::from_millis(200),
    )
    .await;

    assert_eq!(chosen, ["fast", "slow"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn fastest_excludes_erroring_servers_even_below_quota() {
    // Only one healthy server survives although two were wanted; a single
    // transient error during the benchmark disqualifies a server for good.
    let factory = BenchFactory::new(&[
        ("fast", Duration::from_millis(2)),
        ("flaky", Duration::MAX),
    ]);

    let chosen = select::choose_servers(
        servers(&["fast", "flaky", "dead"]),
        2,
        Strategy::Fastest,
        factory,
        Duration::from_millis(100),
    )
    .await;

    assert_eq!(chosen, ["fast"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn random_samples_without_replacement() {
    let factory = BenchFactory::new(&[]);
    let discovered: Vec<String> = (0..10).map(|i| format!("dc{i}")).collect();

    let chosen = select::choose_servers(
        discovered.clone(),
        3,
        Strategy::Random,
        factory.clone(),
        Duration::from_millis(100),
    )
    .await;

    assert_eq!(chosen.len(), 3);
    let unique: HashSet<&String> = chosen.iter().collect();
    assert_eq!(unique.len(), 3);
    assert!(chosen.iter().all(|s| discovered.contains(s)));
    assert_eq!(factory.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn all_servers_failing_yields_empty_selection() {
    let factory = BenchFactory::new(&[]);
    let chosen = select::choose_servers(
        servers(&["dead1", "dead2", "dead3"]),
        2,
        Strategy::Fastest,
        factory,
        Duration::from_millis(50),
    )
    .await;
    assert!(chosen.is_empty());
}
