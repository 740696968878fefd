use serde::{Deserialize, Serialize};

pub const SCORE_MODEL_NAME: &str = "v2_fill_evidence";
pub const LONG_RUN_MODEL_NAME: &str = "v4_bd_fill_volume_decay";
pub const RANK_MODEL_NAME: &str = "rank_v1_quality_momentum";

/// Tunables for the instant and long-run scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreParams {
    /// Bell volume at which instant-score strength reaches ~63%
    pub bell_sat: f64,

    /// Observation days at which legacy long-run trust reaches ~63%
    pub trust_day_sat: f64,

    /// Service days at which signal strength's day factor reaches ~63%
    pub bd_day_sat: f64,

    /// Decayed slot volume at which the long-run volume factor reaches ~63%
    pub bd_total_sat: f64,

    /// Half-life in days of long-run entry weights (measured on lead time)
    pub bd_half_life: f64,

    /// Laplace priors for the smoothed fill ratio
    pub bd_prior_bell: f64,
    pub bd_prior_open: f64,

    /// History entries below this scrape health are ignored by the long-run score
    pub bd_input_min_confidence: i64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            bell_sat: 18.0,
            trust_day_sat: 18.0,
            bd_day_sat: 14.0,
            bd_total_sat: 40.0,
            bd_half_life: 28.0,
            bd_prior_bell: 1.0,
            bd_prior_open: 1.0,
            bd_input_min_confidence: 0,
        }
    }
}

impl ScoreParams {
    /// Replaces missing, zero or negative values with the built-in defaults.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        Self {
            bell_sat: positive_or(self.bell_sat, d.bell_sat),
            trust_day_sat: positive_or(self.trust_day_sat, d.trust_day_sat),
            bd_day_sat: positive_or(self.bd_day_sat, d.bd_day_sat),
            bd_total_sat: positive_or(self.bd_total_sat, d.bd_total_sat),
            bd_half_life: positive_or(self.bd_half_life, d.bd_half_life),
            bd_prior_bell: positive_or(self.bd_prior_bell, d.bd_prior_bell),
            bd_prior_open: positive_or(self.bd_prior_open, d.bd_prior_open),
            bd_input_min_confidence: self.bd_input_min_confidence.max(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RankSortMode {
    #[default]
    Raw,
    Lower,
}

impl RankSortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankSortMode::Raw => "raw",
            RankSortMode::Lower => "lower",
        }
    }
}

/// Tunables for the quality/momentum rank score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankParams {
    /// Half-life in days (by observation age) of quality weights
    pub quality_half_life: f64,

    /// Shorter half-life for momentum so recent demand dominates
    pub momentum_half_life: f64,

    /// Decayed bell volume at which momentum reaches ~63%
    pub momentum_bell_sat: f64,

    /// Laplace priors for per-entry fill and the Wilson sums
    pub quality_prior_bell: f64,
    pub quality_prior_open: f64,

    /// Wilson lower-bound confidence parameter
    pub quality_lower_z: f64,

    /// Which rank key orders the final batch
    pub rank_sort_mode: RankSortMode,

    /// Weight multiplier for service dates with no bookable slots
    pub zero_total_weight: f64,

    /// Share of rank earned by quality alone, at most 1
    pub rank_momentum_base: f64,

    pub quality_power: f64,
    pub momentum_power: f64,

    /// Most recent service dates considered
    pub rank_max_window: usize,

    /// History entries below this scrape health are ignored by the rank score
    pub rank_input_min_confidence: i64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            quality_half_life: 60.0,
            momentum_half_life: 14.0,
            momentum_bell_sat: 20.0,
            quality_prior_bell: 1.0,
            quality_prior_open: 1.0,
            quality_lower_z: 1.96,
            rank_sort_mode: RankSortMode::Raw,
            zero_total_weight: 0.35,
            rank_momentum_base: 0.2,
            quality_power: 1.0,
            momentum_power: 1.0,
            rank_max_window: 112,
            rank_input_min_confidence: 0,
        }
    }
}

impl RankParams {
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let base = if !self.rank_momentum_base.is_finite() || self.rank_momentum_base == 0.0 {
            d.rank_momentum_base
        } else {
            self.rank_momentum_base.clamp(0.0, 1.0)
        };
        Self {
            quality_half_life: positive_or(self.quality_half_life, d.quality_half_life),
            momentum_half_life: positive_or(self.momentum_half_life, d.momentum_half_life),
            momentum_bell_sat: positive_or(self.momentum_bell_sat, d.momentum_bell_sat),
            quality_prior_bell: positive_or(self.quality_prior_bell, d.quality_prior_bell),
            quality_prior_open: positive_or(self.quality_prior_open, d.quality_prior_open),
            quality_lower_z: positive_or(self.quality_lower_z, d.quality_lower_z),
            rank_sort_mode: self.rank_sort_mode,
            zero_total_weight: positive_or(self.zero_total_weight, d.zero_total_weight),
            rank_momentum_base: base,
            quality_power: positive_or(self.quality_power, d.quality_power),
            momentum_power: positive_or(self.momentum_power, d.momentum_power),
            rank_max_window: self.rank_max_window.max(1),
            rank_input_min_confidence: self.rank_input_min_confidence.max(0),
        }
    }
}

pub(crate) fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}
