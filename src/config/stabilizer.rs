use serde::{Deserialize, Serialize};

/// Timing bounds for calendar stabilization. All values are milliseconds
/// unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Per-navigation timeout
    pub nav_timeout_ms: u64,

    /// Upper bound for any single stabilization budget
    pub cal_wait_ms: u64,

    /// First budget tried for every item
    pub short_wait_ms: u64,

    /// Second budget, only used when the page shows calendar evidence
    pub long_wait_ms: u64,

    /// Slow-mode poll step
    pub step_ms: u64,

    /// How long to wait for `table, td` before switching to slow mode
    pub fast_wait_ms: u64,

    /// Poll step while the light signature settles in fast mode
    pub fast_step_ms: u64,

    /// Settle time after a navigation before the first probe
    pub after_goto_wait_ms: u64,

    /// Second look after a reservation-block phrase is seen in the body
    pub text_hit_reprobe_ms: u64,

    /// Consecutive equal light signatures required before a full evaluation
    pub light_quorum: u32,

    /// An empty-src reserve iframe is abandoned after this much waiting
    pub iframe_no_src_grace_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            nav_timeout_ms: 45_000,
            cal_wait_ms: 20_000,
            short_wait_ms: 2_000,
            long_wait_ms: 10_000,
            step_ms: 500,
            fast_wait_ms: 500,
            fast_step_ms: 200,
            after_goto_wait_ms: 600,
            text_hit_reprobe_ms: 1_800,
            light_quorum: 2,
            iframe_no_src_grace_ms: 4_000,
        }
    }
}

impl StabilizerConfig {
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let pick = |v: u64, fallback: u64| if v > 0 { v } else { fallback };
        Self {
            nav_timeout_ms: pick(self.nav_timeout_ms, d.nav_timeout_ms),
            cal_wait_ms: pick(self.cal_wait_ms, d.cal_wait_ms),
            short_wait_ms: pick(self.short_wait_ms, d.short_wait_ms),
            long_wait_ms: pick(self.long_wait_ms, d.long_wait_ms),
            step_ms: pick(self.step_ms, d.step_ms),
            fast_wait_ms: pick(self.fast_wait_ms, d.fast_wait_ms),
            fast_step_ms: pick(self.fast_step_ms, d.fast_step_ms),
            after_goto_wait_ms: pick(self.after_goto_wait_ms, d.after_goto_wait_ms),
            text_hit_reprobe_ms: pick(self.text_hit_reprobe_ms, d.text_hit_reprobe_ms),
            light_quorum: if self.light_quorum > 0 { self.light_quorum } else { d.light_quorum },
            iframe_no_src_grace_ms: pick(self.iframe_no_src_grace_ms, d.iframe_no_src_grace_ms),
        }
    }

    pub fn short_budget_ms(&self) -> u64 {
        self.cal_wait_ms.min(self.short_wait_ms)
    }

    pub fn long_budget_ms(&self) -> u64 {
        self.cal_wait_ms.min(self.long_wait_ms)
    }
}
