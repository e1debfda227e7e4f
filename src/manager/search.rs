/// Bounded fan-out over provider drivers
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::broker::models::ProviderCluster;
use crate::broker::Broker;
use crate::config::SearchConfig;
use crate::error::{Error, Result};

/// A cluster together with the driver that found it
pub struct Hit {
    pub cluster: ProviderCluster,
    pub broker: Arc<dyn Broker>,
}

/// Run one driver call under the probe timeout
pub async fn with_timeout<T, F>(provider: &str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::ProbeTimeout {
            provider: provider.to_string(),
            after,
        }),
    }
}

/// Probe a single driver for `name`; any failure counts as a miss.
pub async fn probe(broker: &Arc<dyn Broker>, name: &str, after: Duration) -> Option<ProviderCluster> {
    let endpoint = broker.endpoint();
    match with_timeout(&endpoint, after, broker.get_cluster_info(name)).await {
        Ok(cluster) => Some(cluster),
        Err(e) if e.is_terminal() => {
            debug!("Cluster {} not on {}: {}", name, endpoint, e);
            None
        }
        Err(e) => {
            warn!(
                "Get cluster info on {} failed on {} provider {} with error: {}",
                name,
                broker.kind(),
                endpoint,
                e
            );
            None
        }
    }
}

/// Probe `brokers` for `name` and return the first hit.
///
/// Up to `max_concurrent_probes` calls are in flight, but results are
/// consumed in candidate order, so the earliest candidate holding the cluster
/// wins. Returning drops the stream, which cancels outstanding probes.
pub async fn first_hit(
    brokers: Vec<Arc<dyn Broker>>,
    name: &str,
    settings: &SearchConfig,
) -> Option<Hit> {
    let after = settings.probe_timeout();
    let mut probes = stream::iter(brokers)
        .map(|broker| async move {
            let found = probe(&broker, name, after).await;
            (broker, found)
        })
        .buffered(settings.max_concurrent_probes.max(1));

    while let Some((broker, found)) = probes.next().await {
        if let Some(cluster) = found {
            return Some(Hit { cluster, broker });
        }
    }

    None
}

/// List clusters on every driver, keeping candidate order in the output
pub async fn list_all(
    brokers: Vec<Arc<dyn Broker>>,
    settings: &SearchConfig,
) -> Vec<(Arc<dyn Broker>, Result<Vec<ProviderCluster>>)> {
    let after = settings.probe_timeout();
    stream::iter(brokers)
        .map(|broker| async move {
            let listing = with_timeout(&broker.endpoint(), after, broker.list_clusters()).await;
            (broker, listing)
        })
        .buffered(settings.max_concurrent_probes.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBroker;
    use std::time::Instant;

    fn settings(concurrency: usize, timeout_secs: u64) -> SearchConfig {
        SearchConfig {
            probe_timeout_secs: timeout_secs,
            max_concurrent_probes: concurrency,
        }
    }

    #[tokio::test]
    async fn test_first_hit_skips_misses_and_failures() {
        let a = FakeBroker::external("pks-1");
        let b = FakeBroker::external("pks-2").failing();
        let c = FakeBroker::external("pks-3").with_cluster("web-app");
        let brokers: Vec<Arc<dyn Broker>> = vec![a.clone(), b.clone(), c.clone()];

        let hit = first_hit(brokers, "web-app", &settings(1, 5)).await.unwrap();
        assert_eq!(hit.cluster.name(), "web-app");
        assert_eq!(hit.broker.endpoint(), "pks-3");
        assert_eq!(a.calls(), vec!["get web-app"]);
        assert_eq!(b.calls(), vec!["get web-app"]);
    }

    #[tokio::test]
    async fn test_first_hit_prefers_earliest_candidate() {
        let slow = FakeBroker::external("pks-1")
            .with_cluster("dup")
            .with_delay(Duration::from_millis(100));
        let fast = FakeBroker::external("pks-2").with_cluster("dup");
        let brokers: Vec<Arc<dyn Broker>> = vec![slow, fast];

        let hit = first_hit(brokers, "dup", &settings(4, 5)).await.unwrap();
        assert_eq!(hit.broker.endpoint(), "pks-1");
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out_as_miss() {
        let hanging = FakeBroker::external("pks-1")
            .with_cluster("web-app")
            .with_delay(Duration::from_secs(3600));
        let brokers: Vec<Arc<dyn Broker>> = vec![hanging];

        let start = Instant::now();
        assert!(first_hit(brokers, "web-app", &settings(1, 1)).await.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_later_probes_not_started_after_hit() {
        let a = FakeBroker::external("pks-1").with_cluster("web-app");
        let b = FakeBroker::external("pks-2");
        let brokers: Vec<Arc<dyn Broker>> = vec![a, b.clone()];

        assert!(first_hit(brokers, "web-app", &settings(1, 5)).await.is_some());
        assert!(b.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_keeps_order() {
        let a = FakeBroker::external("pks-1")
            .with_cluster("a1")
            .with_delay(Duration::from_millis(50));
        let b = FakeBroker::external("pks-2").with_cluster("b1");
        let brokers: Vec<Arc<dyn Broker>> = vec![a, b];

        let listings = list_all(brokers, &settings(4, 5)).await;
        let endpoints: Vec<_> = listings.iter().map(|(b, _)| b.endpoint()).collect();
        assert_eq!(endpoints, ["pks-1", "pks-2"]);
        assert!(listings.iter().all(|(_, l)| l.is_ok()));
    }

    #[tokio::test]
    async fn test_with_timeout_reports_provider() {
        let result: Result<()> = with_timeout("pks-9", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::ProbeTimeout { ref provider, .. }) if provider == "pks-9"));
    }
}
