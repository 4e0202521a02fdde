//! How a node spreads values to its peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dissemination strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Periodic sync rounds only.
    AntiEntropy,
    /// Immediate re-broadcast to neighbors only.
    Flood,
    /// Flood as the first hop, sync rounds to repair what it misses.
    #[default]
    Hybrid,
}

impl Strategy {
    pub fn floods(self) -> bool {
        matches!(self, Strategy::Flood | Strategy::Hybrid)
    }

    pub fn syncs(self) -> bool {
        matches!(self, Strategy::AntiEntropy | Strategy::Hybrid)
    }

    /// Relay values admitted from a `sync` batch onward. Without sync
    /// rounds a repaired value has no other way to travel further.
    pub fn relays_synced(self) -> bool {
        self.floods() && !self.syncs()
    }
}

/// What a sync request carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPayload {
    /// The whole replica set.
    Full,
    /// Only values the peer is not known to hold.
    #[default]
    Delta,
}

/// Which peers a sync round contacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncTargets {
    /// Neighbors from the assigned topology.
    #[default]
    Neighbors,
    /// Every other node in the cluster.
    Cluster,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseStrategyError {
    kind: &'static str,
    input: String,
}

impl fmt::Display for ParseStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.input)
    }
}

impl std::error::Error for ParseStrategyError {}

macro_rules! kebab_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseStrategyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(ParseStrategyError {
                        kind: $kind,
                        input: other.to_string(),
                    }),
                }
            }
        }
    };
}

kebab_enum!(Strategy, "strategy", {
    AntiEntropy => "anti-entropy",
    Flood => "flood",
    Hybrid => "hybrid",
});

kebab_enum!(SyncPayload, "sync payload", {
    Full => "full",
    Delta => "delta",
});

kebab_enum!(SyncTargets, "sync targets", {
    Neighbors => "neighbors",
    Cluster => "cluster",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_floods_and_syncs() {
        assert!(Strategy::Hybrid.floods() && Strategy::Hybrid.syncs());
        assert!(Strategy::Flood.floods() && !Strategy::Flood.syncs());
        assert!(Strategy::Flood.relays_synced());
        assert!(!Strategy::Hybrid.relays_synced() && !Strategy::AntiEntropy.relays_synced());
        assert!(!Strategy::AntiEntropy.floods() && Strategy::AntiEntropy.syncs());
    }

    #[test]
    fn parses_kebab_case_names() {
        assert_eq!("anti-entropy".parse::<Strategy>(), Ok(Strategy::AntiEntropy));
        assert_eq!("full".parse::<SyncPayload>(), Ok(SyncPayload::Full));
        assert_eq!("cluster".parse::<SyncTargets>(), Ok(SyncTargets::Cluster));

        let err = "gossip".parse::<Strategy>().unwrap_err();
        assert_eq!(err.to_string(), "unknown strategy: gossip");
        assert_eq!(Strategy::default().to_string(), "hybrid");
    }
}
