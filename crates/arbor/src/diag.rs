//! Per-frame counters collected by the manager.
//!
//! Enabled by the `diagnostics` feature flag (on by default). The counters are
//! reset at the start of every [`Manager::update`](crate::ecs::Manager::update)
//! and read back through
//! [`Manager::diagnostics`](crate::ecs::Manager::diagnostics).

use serde::Serialize;

/// Timing of one system's `update` hook.
#[derive(Debug, Clone, Serialize)]
pub struct SystemTiming {
    pub name: String,
    pub duration_us: f64,
}

/// Snapshot of what happened during the current frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameStats {
    /// Number of `update()` calls so far.
    pub frame: u64,
    pub entities_created: u32,
    pub entities_removed: u32,
    pub components_added: u32,
    pub components_reclaimed: u32,
    pub system_timings: Vec<SystemTiming>,
}

impl FrameStats {
    pub(crate) fn begin_frame(&mut self) {
        self.frame += 1;
        self.entities_created = 0;
        self.entities_removed = 0;
        self.components_added = 0;
        self.components_reclaimed = 0;
        self.system_timings.clear();
    }

    /// Total time spent in system updates this frame, in microseconds.
    pub fn total_system_us(&self) -> f64 {
        self.system_timings.iter().map(|t| t.duration_us).sum()
    }

    /// Compact JSON form, handy for piping into external tooling.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
