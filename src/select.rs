//! Server selection: benchmark or sample discovered servers down to the
//! wanted count.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::seq::IndexedRandom;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::session::SessionFactory;

/// How to pick servers when more are discovered than wanted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Benchmark every server and keep the ones completing the most pings
    Fastest,
    /// Uniform sample without replacement
    Random,
}

/// Wall-clock window for the fastest-strategy benchmark.
pub const BENCH_WINDOW: Duration = Duration::from_secs(2);

/// Reduce the discovered servers to at most `maxservers`.
///
/// When the discovered set already fits, it is returned unchanged and the
/// strategy is never consulted; no benchmark connection is opened.
pub async fn choose_servers(
    discovered: Vec<String>,
    maxservers: usize,
    strategy: Strategy,
    factory: Arc<dyn SessionFactory>,
    window: Duration,
) -> Vec<String> {
    if discovered.len() <= maxservers {
        return discovered;
    }
    info!(
        "selecting {maxservers} of {} servers with strategy {strategy:?}",
        discovered.len()
    );
    match strategy {
        Strategy::Random => discovered
            .choose_multiple(&mut rand::rng(), maxservers)
            .cloned()
            .collect(),
        Strategy::Fastest => {
            let mut ranked = rank(measure(discovered, factory, window).await);
            ranked.truncate(maxservers);
            ranked
        }
    }
}

/// Benchmark all servers concurrently: count ping iterations completed
/// within the window. A connect failure or any probe error disqualifies the
/// server outright; a single transient error is enough, there is no retry
/// inside the benchmark.
pub async fn measure(
    servers: Vec<String>,
    factory: Arc<dyn SessionFactory>,
    window: Duration,
) -> Vec<(String, u64)> {
    let mut tasks = FuturesUnordered::new();
    for server in servers {
        let factory = factory.clone();
        tasks.push(tokio::spawn(async move {
            let start = Instant::now();
            let mut session = match factory.connect(&server).await {
                Ok(session) => session,
                Err(err) => {
                    warn!(server = %server, "benchmark connect failed: {err:#}");
                    return None;
                }
            };
            let mut iterations: u64 = 0;
            while start.elapsed() < window {
                if let Err(err) = session.probe(None).await {
                    warn!(server = %server, "benchmark probe failed: {err:#}");
                    return None;
                }
                iterations += 1;
            }
            session.close().await;
            Some((server, iterations))
        }));
    }

    let mut scores = Vec::new();
    while let Some(res) = tasks.next().await {
        if let Ok(Some(score)) = res {
            scores.push(score);
        }
    }
    scores
}

/// Order surviving servers by iteration count, best first.
pub fn rank(mut scores: Vec<(String, u64)>) -> Vec<String> {
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    scores.into_iter().map(|(server, _)| server).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_by_iterations_descending() {
        let scores = vec![
            ("slow".to_string(), 40),
            ("fast".to_string(), 900),
            ("mid".to_string(), 200),
        ];
        assert_eq!(rank(scores), ["fast", "mid", "slow"]);
    }

    #[test]
    fn rank_of_empty_is_empty() {
        assert!(rank(Vec::new()).is_empty());
    }
}
