//! Dissemination engine building blocks.
//!
//! Everything here is transport-agnostic: the planners decide *who* gets
//! *what*, the [`RoundGate`] decides *when*, and the [`ClusterSimulator`]
//! drives many in-process replicas through the same planners over a
//! deterministic, optionally lossy network.
//!
//! - [`strategy`] - strategy and payload selection
//! - [`gate`] - single-flight guard for periodic sync rounds
//! - [`planner`] - sync and flood target selection
//! - [`simulator`] - deterministic cluster simulation

pub mod gate;
pub mod planner;
pub mod simulator;
pub mod strategy;

pub use gate::{GateState, RoundGate, RoundPermit};
pub use planner::{flood_targets, relay_plan, SyncPlan, SyncPlanner};
pub use simulator::{ClusterSimulator, NetworkConfig, NetworkSimulator, SimMessage};
pub use strategy::{ParseStrategyError, Strategy, SyncPayload, SyncTargets};
