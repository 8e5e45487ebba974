//! Runtime Configuration
//!
//! A `RuntimeConfig` controls how the scheduler settles cascades and how
//! eagerly it reclaims bookkeeping for dropped objects. It derives
//! `Deserialize` so hosts can embed it in their own configuration files.

use serde::Deserialize;

use crate::error::Result;

/// What happens to reactions enqueued while a flush is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// The flush drains the live pending set, so cascades settle within
    /// one tick.
    #[default]
    SamePass,

    /// The flush runs a snapshot; reactions enqueued during it wait for
    /// the next deferred flush.
    NextTick,
}

/// Scheduler and registry settings for one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Cascade settling policy.
    pub cascade: CascadePolicy,

    /// Upper bound on reaction runs within a single `SamePass` flush.
    pub max_flush_runs: usize,

    /// Drop registry tables of deallocated objects after every flush.
    pub sweep_after_flush: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cascade: CascadePolicy::SamePass,
            max_flush_runs: 10_000,
            sweep_after_flush: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
