//! Drives dissemination for a live node.
//!
//! Two paths share the same store and topology:
//!
//! - **Sync rounds.** A timer ticks every `sync_interval`. Each tick tries to
//!   take the [`RoundGate`]; if a round is still outstanding the tick is
//!   dropped. A round sends one `sync` per planned peer, all concurrently,
//!   and holds the gate until every request has been acknowledged, has
//!   failed, or has hit `rpc_timeout`. A peer that never answers therefore
//!   delays the next round by at most one timeout, and never builds a backlog.
//! - **Flood.** A newly admitted `broadcast` value is re-sent to every
//!   neighbor that might not have it, from a spawned task. Each relay also
//!   carries every older value that neighbor has not acknowledged, so a
//!   relay that failed is retried by the next one. A single value goes out
//!   as `broadcast`, a batch as `sync`. At most `max_inflight_fanouts` such
//!   tasks run at once; when all slots are taken the relay is skipped and
//!   the next relay or sync round carries the value.
//!
//! Failures to reach one peer are logged and never affect the others.

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::protocol::Payload;
use crate::transport::{Endpoint, Transport};
use futures::future::join_all;
use murmur_core::{NodeId, ReplicaStore, TopologyManager, Value};
use murmur_sync::{relay_plan, RoundGate, SyncPlan, SyncPlanner};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Outcome of one sync round or one flood fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Peers contacted.
    pub attempted: usize,
    /// Peers that acknowledged.
    pub acknowledged: usize,
    /// New provenance entries learned from acknowledgments.
    pub recorded: usize,
}

impl RoundReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.acknowledged
    }
}

pub struct Disseminator<T: Transport> {
    endpoint: Arc<Endpoint<T>>,
    store: Arc<ReplicaStore>,
    topology: Arc<TopologyManager>,
    cluster: Arc<[NodeId]>,
    config: NodeConfig,
    planner: SyncPlanner,
    gate: Arc<RoundGate>,
    fanout_slots: Arc<Semaphore>,
}

impl<T: Transport> Clone for Disseminator<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
            store: Arc::clone(&self.store),
            topology: Arc::clone(&self.topology),
            cluster: Arc::clone(&self.cluster),
            config: self.config.clone(),
            planner: self.planner,
            gate: Arc::clone(&self.gate),
            fanout_slots: Arc::clone(&self.fanout_slots),
        }
    }
}

impl<T: Transport> Disseminator<T> {
    pub fn new(
        endpoint: Arc<Endpoint<T>>,
        store: Arc<ReplicaStore>,
        topology: Arc<TopologyManager>,
        cluster: Arc<[NodeId]>,
        config: NodeConfig,
    ) -> Self {
        let planner = SyncPlanner::new(config.sync_payload, config.sync_targets);
        let fanout_slots = Arc::new(Semaphore::new(config.max_inflight_fanouts));
        Self {
            endpoint,
            store,
            topology,
            cluster,
            config,
            planner,
            gate: RoundGate::new(),
            fanout_slots,
        }
    }

    pub fn gate(&self) -> &Arc<RoundGate> {
        &self.gate
    }

    /// Start the sync timer. Returns `None` when the strategy never syncs.
    pub fn spawn_timer(&self) -> Option<JoinHandle<()>> {
        if !self.config.strategy.syncs() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.sync_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                this.tick();
            }
        }))
    }

    /// Handle one timer tick. Returns `true` if a round was started.
    pub fn tick(&self) -> bool {
        if !self.topology.is_assigned() {
            trace!("no topology yet, skipping sync tick");
            return false;
        }
        let Some(permit) = self.gate.try_begin() else {
            debug!("sync round still in flight, coalescing tick");
            return false;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let report = this.sync_round().await;
            if report.attempted > 0 {
                debug!(
                    round = permit.round(),
                    attempted = report.attempted,
                    acknowledged = report.acknowledged,
                    recorded = report.recorded,
                    "sync round finished"
                );
            }
            drop(permit);
        });
        true
    }

    /// Run one sync round to completion, ignoring the gate.
    pub async fn sync_round(&self) -> RoundReport {
        let plans = self.planner.plan(
            self.endpoint.id(),
            &self.store,
            &self.topology,
            &self.cluster,
        );
        let outcomes = join_all(plans.into_iter().map(|plan| self.sync_peer(plan))).await;

        let mut report = RoundReport::default();
        for outcome in outcomes {
            report.attempted += 1;
            if let Some(recorded) = outcome {
                report.acknowledged += 1;
                report.recorded += recorded;
            }
        }
        report
    }

    async fn sync_peer(&self, plan: SyncPlan) -> Option<usize> {
        let SyncPlan { peer, messages } = plan;
        let count = messages.len();
        let result = self
            .endpoint
            .rpc(&peer, Payload::Sync { messages }, self.config.rpc_timeout())
            .await
            .map_err(NodeError::from)
            .and_then(|reply| match reply.body.payload {
                Payload::SyncOk { messages } => Ok(self.store.record_delivery(&peer, &messages)),
                other => Err(NodeError::UnexpectedReply {
                    request: "sync",
                    got: other.kind(),
                }),
            });

        match result {
            Ok(recorded) => {
                trace!(peer = %peer, sent = count, recorded, "sync acknowledged");
                Some(recorded)
            }
            Err(err) => {
                warn!(peer = %peer, error = %err, "failed to sync to peer");
                None
            }
        }
    }

    /// Re-send a freshly admitted `value` received from `source` to the
    /// neighbors that may lack it. Returns `true` if a fan-out was spawned.
    pub fn flood(&self, value: Value, source: &NodeId) -> bool {
        self.relay(&[value], source)
    }

    /// Relay freshly admitted `values` from `source`, with each target's
    /// unacknowledged backlog attached.
    pub fn relay(&self, values: &[Value], source: &NodeId) -> bool {
        let plans = relay_plan(
            self.endpoint.id(),
            values,
            source,
            &self.store,
            &self.topology,
        );
        if plans.is_empty() {
            return false;
        }
        let Ok(slot) = Arc::clone(&self.fanout_slots).try_acquire_owned() else {
            debug!(values = ?values, "all fan-out slots busy, leaving values to the next relay");
            return false;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _slot = slot;
            this.fan_out(plans).await;
        });
        true
    }

    /// Send every relay plan concurrently.
    pub async fn fan_out(&self, plans: Vec<SyncPlan>) -> RoundReport {
        let outcomes = join_all(plans.into_iter().map(|plan| self.relay_to(plan))).await;

        let mut report = RoundReport::default();
        for outcome in outcomes {
            report.attempted += 1;
            if let Some(recorded) = outcome {
                report.acknowledged += 1;
                report.recorded += recorded;
            }
        }
        if report.attempted > 0 && report.acknowledged == 0 {
            warn!(attempted = report.attempted, "relay reached no neighbor");
        }
        report
    }

    async fn relay_to(&self, plan: SyncPlan) -> Option<usize> {
        let SyncPlan { peer, messages } = plan;
        let (request, payload) = match messages.as_slice() {
            [message] => ("broadcast", Payload::Broadcast { message: *message }),
            _ => (
                "sync",
                Payload::Sync {
                    messages: messages.clone(),
                },
            ),
        };
        let result = self
            .endpoint
            .rpc(&peer, payload, self.config.rpc_timeout())
            .await
            .map_err(NodeError::from)
            .and_then(|reply| match reply.body.payload {
                Payload::BroadcastOk => Ok(self.store.record_delivery(&peer, &messages)),
                Payload::SyncOk { messages: acked } => Ok(self.store.record_delivery(&peer, &acked)),
                other => Err(NodeError::UnexpectedReply {
                    request,
                    got: other.kind(),
                }),
            });

        match result {
            Ok(recorded) => Some(recorded),
            Err(err) => {
                debug!(peer = %peer, values = messages.len(), error = %err, "relay failed");
                None
            }
        }
    }
}
