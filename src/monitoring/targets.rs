/// Scrape target health checks
use std::time::Duration;

use super::{with_timeout, ActiveTarget, MonitoringApi, HEALTH_UP, QUERY_TIMEOUT};
use crate::utils::polling::{NotReady, PollingConfig, UnhealthyEntity};

pub fn scrape_targets_polling() -> PollingConfig {
    PollingConfig::new(20, Duration::from_secs(60), "Checking scrape targets")
}

/// Every target that is not up, in the order Prometheus lists them
pub fn unhealthy_targets(targets: &[ActiveTarget]) -> Vec<UnhealthyEntity> {
    targets
        .iter()
        .filter(|t| t.health != HEALTH_UP)
        .map(|t| UnhealthyEntity::new(t.service_id(), &t.health))
        .collect()
}

/// One attempt: all active targets must be up
pub async fn probe_scrape_targets<A: MonitoringApi + ?Sized>(
    api: &A,
) -> Result<usize, NotReady> {
    let targets = with_timeout(QUERY_TIMEOUT, "Listing targets", api.active_targets())
        .await
        .map_err(|e| NotReady::new(format!("error listing targets from prometheus: {:#}", e)))?;

    let unhealthy = unhealthy_targets(&targets);
    if unhealthy.is_empty() {
        return Ok(targets.len());
    }

    Err(NotReady::new("some prometheus scrape targets are down").with_unhealthy(unhealthy))
}
