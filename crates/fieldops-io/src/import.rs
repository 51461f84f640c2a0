//! CSV importers (§6): one function per input table, each parsing its wire
//! records into the canonical core types and converting units at the
//! boundary.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fieldops_core::{Asset, BranchId, Partner, PartnerId, SkuLine, SupervisorId, TimeWindow};

use crate::records::{
    parse_flag, parse_hms_seconds, parse_weekday, AssetRecord, PartnerRecord, PointMappingRecord,
    SkuLineRecord, TravelMatrixRecord,
};

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::Reader::from_path(path).with_context(|| format!("opening CSV file '{}'", path.display()))
}

/// Reads the partners table and joins it against the point-id mapping table
/// (both keyed by `(branch, partner)`) so each `Partner` carries its routing
/// point id directly.
pub fn read_partners(partners_path: &Path, point_mapping_path: &Path) -> Result<Vec<Partner>> {
    let mut point_ids: HashMap<(u64, u64), String> = HashMap::new();
    let mut mapping_reader = csv_reader(point_mapping_path)?;
    for row in mapping_reader.deserialize() {
        let row: PointMappingRecord =
            row.with_context(|| format!("parsing '{}'", point_mapping_path.display()))?;
        point_ids.insert((row.branch, row.partner), row.point_id);
    }

    let mut partners = Vec::new();
    let mut reader = csv_reader(partners_path)?;
    for row in reader.deserialize() {
        let row: PartnerRecord = row.with_context(|| format!("parsing '{}'", partners_path.display()))?;
        let open = parse_hms_seconds(&row.open_time)
            .with_context(|| format!("partner {} open_time", row.partner))?;
        let close = parse_hms_seconds(&row.close_time)
            .with_context(|| format!("partner {} close_time", row.partner))?;
        let fixed_weekday = parse_weekday(&row.fixed_weekday)
            .with_context(|| format!("partner {} fixed_weekday", row.partner))?;
        let point_id = point_ids
            .get(&(row.branch, row.partner))
            .cloned()
            .unwrap_or_else(|| row.partner.to_string());

        partners.push(Partner {
            id: PartnerId::original(row.partner),
            branch: BranchId::new(row.branch),
            window: TimeWindow::new(open, close),
            entry_time_s: (row.entry_time_min * 60.0).round() as i64,
            fixed_weekday,
            supervisor: SupervisorId::new(row.supervisor),
            point_id,
            lat: row.lat,
            lon: row.lon,
        });
    }
    Ok(partners)
}

pub fn read_assets(path: &Path) -> Result<Vec<Asset>> {
    let mut assets = Vec::new();
    let mut reader = csv_reader(path)?;
    for row in reader.deserialize() {
        let row: AssetRecord = row.with_context(|| format!("parsing '{}'", path.display()))?;
        let split_eligible = parse_flag(&row.split_eligible)
            .with_context(|| format!("asset {} split_eligible", row.asset))?;
        assets.push(Asset {
            id: PartnerId::original(row.asset),
            partner: PartnerId::original(row.partner),
            service_time_s: (row.service_time_min * 60.0).round() as i64,
            days_per_week: row.days_per_week,
            min_frequency: row.min_frequency,
            current_frequency: row.current_frequency,
            split_eligible,
        });
    }
    Ok(assets)
}

pub fn read_sku_lines(path: &Path) -> Result<Vec<SkuLine>> {
    let mut lines = Vec::new();
    let mut reader = csv_reader(path)?;
    for row in reader.deserialize() {
        let row: SkuLineRecord = row.with_context(|| format!("parsing '{}'", path.display()))?;
        lines.push(SkuLine {
            asset: PartnerId::original(row.asset),
            sku: row.sku,
            capacity: row.capacity,
            reposition_level: row.reposition_level,
        });
    }
    Ok(lines)
}

pub fn read_consumption(path: &Path) -> Result<Vec<fieldops_core::ConsumptionRecord>> {
    let mut records = Vec::new();
    let mut reader = csv_reader(path)?;
    for row in reader.deserialize() {
        let row: crate::records::ConsumptionRecord =
            row.with_context(|| format!("parsing '{}'", path.display()))?;
        let start_date = NaiveDate::parse_from_str(&row.start_date, "%Y-%m-%d")
            .with_context(|| format!("consumption row start_date '{}'", row.start_date))?;
        let end_date = NaiveDate::parse_from_str(&row.end_date, "%Y-%m-%d")
            .with_context(|| format!("consumption row end_date '{}'", row.end_date))?;
        records.push(fieldops_core::ConsumptionRecord {
            branch: BranchId::new(row.branch),
            partner: PartnerId::original(row.partner),
            asset: PartnerId::original(row.asset),
            sku: row.sku,
            start_date,
            end_date,
            consumed: row.consumed,
        });
    }
    Ok(records)
}

pub fn read_travel_matrix(path: &Path) -> Result<Vec<fieldops_core::TravelMatrixRow>> {
    let mut rows = Vec::new();
    let mut reader = csv_reader(path)?;
    for row in reader.deserialize() {
        let row: TravelMatrixRecord = row.with_context(|| format!("parsing '{}'", path.display()))?;
        rows.push(fieldops_core::TravelMatrixRow {
            branch: BranchId::new(row.branch),
            point_i: row.point_i,
            point_j: row.point_j,
            distance_m: row.distance_m,
            duration_s: row.duration_s,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_partners_and_joins_point_ids() {
        let mut partners_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            partners_file,
            "branch,partner,open_time,close_time,lat,lon,entry_time_min,supervisor,fixed_weekday"
        )
        .unwrap();
        writeln!(partners_file, "1,100,08:00:00,18:00:00,-23.5,-46.6,5,9,Mon").unwrap();

        let mut mapping_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(mapping_file, "branch,partner,point_id,lat,lon").unwrap();
        writeln!(mapping_file, "1,100,PT-100,-23.5,-46.6").unwrap();

        let partners = read_partners(partners_file.path(), mapping_file.path()).unwrap();
        assert_eq!(partners.len(), 1);
        assert_eq!(partners[0].point_id, "PT-100");
        assert_eq!(partners[0].entry_time_s, 300);
        assert_eq!(partners[0].fixed_weekday, Some(0));
    }
}
