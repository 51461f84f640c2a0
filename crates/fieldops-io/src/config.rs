//! Loads the TOML run configuration (§6 "Config", §10.3): per-branch caps,
//! scale tiers, solver limits, and the tuning knobs the degrade-and-retry
//! loops read.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_weekly_days")]
    pub weekly_days: u8,
    #[serde(default)]
    pub branches: HashMap<String, BranchConfig>,
    #[serde(default = "default_scale_tiers")]
    pub scale_tiers: Vec<ScaleTier>,
    #[serde(default = "default_solver_time_limit_s")]
    pub solver_time_limit_s: u64,
    #[serde(default = "default_modality_margin")]
    pub modality_margin: f64,
    #[serde(default)]
    pub allow_saturday: bool,
    #[serde(default = "default_repasse_gap_h")]
    pub repasse_gap_h: f64,
    #[serde(default = "default_weekly_budget_h")]
    pub weekly_budget_h: f64,
    #[serde(default = "default_replacement_percentile")]
    pub replacement_percentile: f64,
    pub global_reposition_level: Option<f64>,
    pub flexibility: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchConfig {
    #[serde(default = "default_traffic_factor")]
    pub traffic_factor: f64,
    pub max_time_h: f64,
    pub max_dist_km: f64,
    pub saturday_max_time_h: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleTier {
    pub name: String,
    pub hours: f64,
}

fn default_weekly_days() -> u8 {
    5
}

fn default_scale_tiers() -> Vec<ScaleTier> {
    vec![
        ScaleTier { name: "4h".into(), hours: 4.0 },
        ScaleTier { name: "6h".into(), hours: 6.0 },
        ScaleTier { name: "8h".into(), hours: 8.0 },
    ]
}

fn default_solver_time_limit_s() -> u64 {
    180
}

fn default_modality_margin() -> f64 {
    0.10
}

fn default_repasse_gap_h() -> f64 {
    3.0
}

fn default_weekly_budget_h() -> f64 {
    44.0
}

fn default_replacement_percentile() -> f64 {
    85.0
}

fn default_traffic_factor() -> f64 {
    1.0
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file '{}'", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "weekly_days = 6\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.weekly_days, 6);
        assert_eq!(config.solver_time_limit_s, 180);
        assert_eq!(config.scale_tiers.len(), 3);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not_a_real_field = 1\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
