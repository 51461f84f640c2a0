//! Wire record shapes (§6): one struct per input table, columns named and
//! unit-suffixed exactly as the table's CSV header. Conversion into the
//! internal canonical units (seconds, meters) happens at the ingest boundary
//! in `import.rs`, never downstream.

use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PartnerRecord {
    pub branch: u64,
    pub partner: u64,
    pub open_time: String,
    pub close_time: String,
    pub lat: f64,
    pub lon: f64,
    pub entry_time_min: f64,
    pub supervisor: u64,
    pub fixed_weekday: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetRecord {
    pub branch: u64,
    pub partner: u64,
    pub asset: u64,
    pub service_time_min: f64,
    pub days_per_week: u8,
    pub min_frequency: u32,
    pub current_frequency: u32,
    pub split_eligible: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkuLineRecord {
    pub branch: u64,
    pub partner: u64,
    pub asset: u64,
    pub sku: String,
    pub capacity: f64,
    pub reposition_level: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumptionRecord {
    pub branch: u64,
    pub partner: u64,
    pub asset: u64,
    pub sku: String,
    pub start_date: String,
    pub end_date: String,
    pub consumed: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TravelMatrixRecord {
    pub branch: u64,
    pub point_i: String,
    pub point_j: String,
    pub distance_m: f64,
    pub duration_s: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointMappingRecord {
    pub branch: u64,
    pub partner: u64,
    pub point_id: String,
    pub lat: f64,
    pub lon: f64,
}

/// `HH:MM:SS` (or `HH:MM`) to seconds since midnight.
pub fn parse_hms_seconds(text: &str) -> Result<i64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(anyhow!("expected HH:MM[:SS], got '{text}'"));
    }
    let hours: i64 = parts[0].parse()?;
    let minutes: i64 = parts[1].parse()?;
    let seconds: i64 = if parts.len() == 3 { parts[2].parse()? } else { 0 };
    Ok(hours * 3600 + minutes * 60 + seconds)
}

const WEEKDAY_NAMES: [&str; 6] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// `Mon`..`Sat` to `0..5`, empty string to `None` (§6 `fixed_weekday∈{Mon..Sat|∅}`).
pub fn parse_weekday(text: &str) -> Result<Option<u8>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    WEEKDAY_NAMES
        .iter()
        .position(|&name| name.eq_ignore_ascii_case(trimmed))
        .map(|idx| Some(idx as u8))
        .ok_or_else(|| anyhow!("unrecognized weekday '{text}'"))
}

pub fn weekday_name(day: u8) -> &'static str {
    WEEKDAY_NAMES.get(day as usize).copied().unwrap_or("?")
}

pub fn parse_flag(text: &str) -> Result<bool> {
    match text.trim().to_ascii_uppercase().as_str() {
        "S" | "Y" | "TRUE" | "1" => Ok(true),
        "N" | "FALSE" | "0" | "" => Ok(false),
        other => Err(anyhow!("unrecognized flag '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_parses_with_and_without_seconds() {
        assert_eq!(parse_hms_seconds("08:00:00").unwrap(), 8 * 3600);
        assert_eq!(parse_hms_seconds("08:30").unwrap(), 8 * 3600 + 30 * 60);
    }

    #[test]
    fn weekday_round_trips_through_its_name() {
        for day in 0..6u8 {
            let name = weekday_name(day);
            assert_eq!(parse_weekday(name).unwrap(), Some(day));
        }
        assert_eq!(parse_weekday("").unwrap(), None);
    }

    #[test]
    fn flag_accepts_spreadsheet_style_s_n() {
        assert!(parse_flag("S").unwrap());
        assert!(!parse_flag("N").unwrap());
    }
}
