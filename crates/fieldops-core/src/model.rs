//! Entities and essential attributes (§3). Dataframes become typed records;
//! group-by becomes `map<Key, Aggregator>`; joins become hash-merges over
//! explicit key tuples (§9) — no column-keyed dynamic frame survives past
//! the I/O boundary.

use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, PartnerId, SupervisorId};

/// Seconds since a branch-local global origin. Everything downstream of
/// ingest works in this unit; `_min`/`_h` suffixes only exist on the wire.
pub type Seconds = i64;
pub type Meters = f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    Driving,
    Walking,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Driving => "driving",
            Modality::Walking => "walking",
        }
    }
}

/// An opening window, normalized so that `close >= open`. Windows crossing
/// midnight are normalized by adding 24h to `close` at construction time
/// (§3) rather than being special-cased by every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub open: Seconds,
    pub close: Seconds,
}

impl TimeWindow {
    pub fn new(open: Seconds, close: Seconds) -> Self {
        if close < open {
            TimeWindow {
                open,
                close: close + 24 * 3600,
            }
        } else {
            TimeWindow { open, close }
        }
    }

    pub fn duration(&self) -> Seconds {
        self.close - self.open
    }

    pub fn contains(&self, t: Seconds) -> bool {
        t >= self.open && t <= self.close
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub weekly_days: u8, // Dw ∈ {5,6}
    pub max_time_s: Seconds, // Tmax
    pub max_dist_m: Meters, // Dmax
    pub traffic_factor: f64, // α ≥ 1
    pub allow_saturday: bool,
    /// Override of `max_time_s` for Saturday (`d == 5`), if the branch runs one.
    pub saturday_max_time_s: Option<Seconds>,
}

impl Branch {
    pub fn daily_cap(&self, day: u8) -> Seconds {
        if day == 5 {
            self.saturday_max_time_s.unwrap_or(self.max_time_s)
        } else {
            self.max_time_s
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub branch: BranchId,
    pub window: TimeWindow,
    pub entry_time_s: Seconds,
    pub fixed_weekday: Option<u8>,
    pub supervisor: SupervisorId,
    pub point_id: String,
    /// Coordinates, carried through unchanged by the S1 A/B split; used only
    /// by S4's centroid/haversine compatibility check (§4.4), never to
    /// recompute `point_id` (that canonicalization is out of scope, §1).
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: PartnerId, // AssetId, same underlying SplitId type
    pub partner: PartnerId,
    pub service_time_s: Seconds,
    pub days_per_week: u8, // dpw_a ∈ {5,6}
    pub min_frequency: u32,
    pub current_frequency: u32,
    pub split_eligible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuLine {
    pub asset: PartnerId,
    pub sku: String,
    pub capacity: f64,
    pub reposition_level: f64, // ρ_ak ∈ [0,1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub branch: BranchId,
    pub partner: PartnerId,
    pub asset: PartnerId,
    pub sku: String,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub consumed: f64,
}

impl ConsumptionRecord {
    /// Days covered by this record, lower-bounded by 1 (§4.1 step 1).
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days().max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelMatrixRow {
    pub branch: BranchId,
    pub point_i: String,
    pub point_j: String,
    pub distance_m: Meters,
    pub duration_s: Seconds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_crossing_midnight_is_normalized() {
        let w = TimeWindow::new(22 * 3600, 2 * 3600);
        assert_eq!(w.close, 26 * 3600);
        assert!(w.contains(25 * 3600));
    }

    #[test]
    fn branch_daily_cap_honors_saturday_override() {
        let b = Branch {
            id: BranchId::new(1),
            weekly_days: 6,
            max_time_s: 8 * 3600,
            max_dist_m: 100_000.0,
            traffic_factor: 1.1,
            allow_saturday: true,
            saturday_max_time_s: Some(4 * 3600),
        };
        assert_eq!(b.daily_cap(5), 4 * 3600);
        assert_eq!(b.daily_cap(0), 8 * 3600);
    }

    #[test]
    fn consumption_days_floor_is_one() {
        let r = ConsumptionRecord {
            branch: BranchId::new(1),
            partner: PartnerId::original(1),
            asset: PartnerId::original(1),
            sku: "coffee".into(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            consumed: 10.0,
        };
        assert_eq!(r.days(), 1);
    }
}
