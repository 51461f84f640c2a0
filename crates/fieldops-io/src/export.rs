//! CSV exporters (§6): one function per output table. Canonical internal
//! units (seconds, meters) are converted back to the wire's minutes/km only
//! here.

use std::path::Path;

use anyhow::{Context, Result};
use fieldops_core::Modality;
use serde::Serialize;

use crate::records::weekday_name;

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path).with_context(|| format!("creating CSV file '{}'", path.display()))
}

#[derive(Debug, Clone, Serialize)]
pub struct FrequencyRow {
    pub branch: u64,
    pub partner: String,
    pub asset: String,
    pub current: u32,
    pub min: u32,
    pub reposition: u32,
    pub r#final: u32,
}

pub fn write_frequencies(path: &Path, rows: &[FrequencyRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// A per-asset schedule row before it is widened into weekday flag columns.
pub struct ScheduleRow {
    pub branch: u64,
    pub partner: String,
    pub asset: String,
    pub assigned_days: std::collections::BTreeSet<u8>,
}

/// Writes the schedule table with one boolean column per weekday
/// (§6 "a row with 1..Dw flags"), since the column count depends on the
/// branch's `weekly_days` and can't be captured by a fixed derive.
pub fn write_schedule(path: &Path, weekly_days: u8, rows: &[ScheduleRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    let mut header = vec!["branch".to_string(), "partner".to_string(), "asset".to_string()];
    for day in 0..weekly_days {
        header.push(weekday_name(day).to_string());
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.branch.to_string(), row.partner.clone(), row.asset.clone()];
        for day in 0..weekly_days {
            record.push(row.assigned_days.contains(&day).to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteBookRow {
    pub branch: u64,
    pub day: u8,
    pub route: String,
    pub visit_ordinal: u32,
    pub partner: String,
    pub asset: String,
    pub distance_km: f64,
    pub travel_min: f64,
    pub service_min: f64,
    pub modality: String,
    pub scale: String,
}

pub fn write_route_book(path: &Path, rows: &[RouteBookRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSummaryRow {
    pub branch: u64,
    pub day: u8,
    pub route: String,
    pub hours: f64,
    pub fte: f64,
    pub asset_count: u32,
    pub partner_count: u32,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    pub modality: String,
    pub scale: String,
}

pub fn write_route_summary(path: &Path, rows: &[RouteSummaryRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRouteRow {
    pub agent: String,
    pub weekday: u8,
    pub route: String,
    pub modality: String,
    pub scale: String,
    pub hours: f64,
}

pub fn write_agent_routes(path: &Path, rows: &[AgentRouteRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub struct AgentAssetRow {
    pub agent: String,
    pub partner: String,
    pub asset: String,
    pub assigned_days: std::collections::BTreeSet<u8>,
}

pub fn write_agent_assets(path: &Path, weekly_days: u8, rows: &[AgentAssetRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    let mut header = vec!["agent".to_string(), "partner".to_string(), "asset".to_string()];
    for day in 0..weekly_days {
        header.push(weekday_name(day).to_string());
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.agent.clone(), row.partner.clone(), row.asset.clone()];
        for day in 0..weekly_days {
            record.push(row.assigned_days.contains(&day).to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchSummaryRow {
    pub branch: u64,
    pub avg_routes: f64,
    pub avg_fte: f64,
    pub avg_distance_km: f64,
    pub avg_service_min: f64,
    pub avg_travel_min: f64,
    pub avg_frequency: f64,
}

pub fn write_branch_summary(path: &Path, rows: &[BranchSummaryRow]) -> Result<()> {
    let mut writer = csv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn modality_name(modality: Modality) -> &'static str {
    modality.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn schedule_widens_to_one_column_per_weekday() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        let rows = vec![ScheduleRow {
            branch: 1,
            partner: "100".into(),
            asset: "100".into(),
            assigned_days: BTreeSet::from([0, 2]),
        }];
        write_schedule(&path, 5, &rows).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(header, "branch,partner,asset,Mon,Tue,Wed,Thu,Fri");
        let data = content.lines().nth(1).unwrap();
        assert_eq!(data, "1,100,100,true,false,true,false,false");
    }
}
