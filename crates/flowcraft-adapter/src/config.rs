//! Deployment-tunable defaults for a distributed adapter (`spec.md`
//! §4.7, §4.8, §4.9): pill/lock TTLs, heartbeat cadence, and the
//! scheduler tick interval a deployment's ticker process polls at.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TTL for poison and cancellation pills, extended by the worker
/// heartbeat for as long as the job stays in flight.
const DEFAULT_PILL_TTL: Duration = Duration::from_secs(60 * 60);

/// TTL for the short-lived reconciliation lock taken while recomputing
/// a run's frontier.
const DEFAULT_NODE_LOCK_TTL: Duration = Duration::from_secs(30);

/// Interval at which an in-flight worker extends its pills' and join
/// keys' TTLs.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Interval at which a deployment's ticker process should scan the
/// scheduler for due sleeps and re-enqueue them (`spec.md` §4.8).
const DEFAULT_SCHEDULER_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables for one [`crate::BaseAdapter`] deployment, deserializable
/// from a deployment's own configuration file or environment layer.
/// Every field defaults to the value `spec.md` documents; a deployment
/// only needs to set what it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// TTL for poison/cancellation pills and fan-in counters.
    #[serde(with = "duration_millis")]
    pub pill_ttl: Duration,
    /// TTL for the reconciliation node lock.
    #[serde(with = "duration_millis")]
    pub node_lock_ttl: Duration,
    /// How often an in-flight worker extends its pills' TTLs.
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,
    /// How often a deployment's ticker process polls the scheduler for
    /// sleeps that have come due.
    #[serde(with = "duration_millis")]
    pub scheduler_tick_interval: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            pill_ttl: DEFAULT_PILL_TTL,
            node_lock_ttl: DEFAULT_NODE_LOCK_TTL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            scheduler_tick_interval: DEFAULT_SCHEDULER_TICK_INTERVAL,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_baseline() {
        let config = AdapterConfig::default();
        assert_eq!(config.pill_ttl, Duration::from_secs(3600));
        assert_eq!(config.node_lock_ttl, Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1800));
        assert_eq!(config.scheduler_tick_interval, Duration::from_millis(100));
    }

    #[test]
    fn round_trips_through_json_as_millis() {
        let config = AdapterConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["pill_ttl"], serde_json::json!(3_600_000));
        let restored: AdapterConfig = serde_json::from_value(json).unwrap();
        assert_eq!(restored.pill_ttl, config.pill_ttl);
    }

    #[test]
    fn a_partial_override_keeps_the_rest_at_their_defaults() {
        let config: AdapterConfig = serde_json::from_value(serde_json::json!({"heartbeat_interval": 5000})).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(5000));
        assert_eq!(config.pill_ttl, Duration::from_secs(3600));
    }
}
