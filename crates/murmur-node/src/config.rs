//! Node configuration.

use murmur_sync::{Strategy, SyncPayload, SyncTargets};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for dissemination behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Which dissemination strategy to run.
    pub strategy: Strategy,
    /// How often to start a sync round (in milliseconds).
    pub sync_interval_ms: u64,
    /// Timeout for every peer RPC (in milliseconds).
    pub rpc_timeout_ms: u64,
    /// Whole set or only what the peer lacks.
    pub sync_payload: SyncPayload,
    /// Topology neighbors or the whole cluster.
    pub sync_targets: SyncTargets,
    /// Flood fan-outs allowed to run at the same time.
    pub max_inflight_fanouts: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Hybrid,
            sync_interval_ms: 500,
            rpc_timeout_ms: 1000,
            sync_payload: SyncPayload::Delta,
            sync_targets: SyncTargets::Neighbors,
            max_inflight_fanouts: 64,
        }
    }
}

impl NodeConfig {
    pub fn builder() -> NodeConfigBuilder {
        NodeConfigBuilder::new()
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Builder for node configuration.
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn sync_interval(mut self, ms: u64) -> Self {
        self.config.sync_interval_ms = ms;
        self
    }

    pub fn rpc_timeout(mut self, ms: u64) -> Self {
        self.config.rpc_timeout_ms = ms;
        self
    }

    pub fn sync_payload(mut self, payload: SyncPayload) -> Self {
        self.config.sync_payload = payload;
        self
    }

    pub fn sync_targets(mut self, targets: SyncTargets) -> Self {
        self.config.sync_targets = targets;
        self
    }

    pub fn max_inflight_fanouts(mut self, slots: usize) -> Self {
        self.config.max_inflight_fanouts = slots;
        self
    }

    pub fn build(self) -> NodeConfig {
        self.config
    }
}

impl Default for NodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_builder() {
        let config = NodeConfig::builder()
            .strategy(Strategy::AntiEntropy)
            .sync_interval(250)
            .rpc_timeout(3000)
            .sync_payload(SyncPayload::Full)
            .sync_targets(SyncTargets::Cluster)
            .max_inflight_fanouts(8)
            .build();

        assert_eq!(config.strategy, Strategy::AntiEntropy);
        assert_eq!(config.sync_interval(), Duration::from_millis(250));
        assert_eq!(config.rpc_timeout(), Duration::from_secs(3));
        assert_eq!(config.sync_payload, SyncPayload::Full);
        assert_eq!(config.sync_targets, SyncTargets::Cluster);
        assert_eq!(config.max_inflight_fanouts, 8);
    }

    #[test]
    fn defaults_match_reference_cadence() {
        let config = NodeConfig::default();
        assert_eq!(config.strategy, Strategy::Hybrid);
        assert_eq!(config.sync_interval(), Duration::from_millis(500));
        assert_eq!(config.sync_payload, SyncPayload::Delta);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"strategy":"flood","sync_interval_ms":100}"#).unwrap();
        assert_eq!(config.strategy, Strategy::Flood);
        assert_eq!(config.sync_interval_ms, 100);
        assert_eq!(config.rpc_timeout_ms, 1000);
    }
}
