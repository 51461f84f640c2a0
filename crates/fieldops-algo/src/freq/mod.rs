//! S1 Frequency Engine (§4.1): derive visits/week per asset from measured
//! consumption, then optionally rewrite overloaded assets/partners into A/B
//! halves ("repasses").

use std::collections::HashMap;

use fieldops_core::{
    Asset, ConsumptionRecord, Diagnostics, FieldOpsResult, Half, Partner, PartnerId, Seconds,
    SkuLine, TimeWindow,
};

#[derive(Debug, Clone)]
pub struct FrequencyConfig {
    /// Uniform reposition level override (§4.1 step 2, mode b). When `None`,
    /// each SKU line's own `reposition_level` is used (mode a).
    pub global_reposition_level: Option<f64>,
    /// Flexibility applied to `fmin_a` (§4.1 step 5), in visits/week.
    pub flexibility: Option<u32>,
    /// Overwrite every asset's frequency with its partner's maximum (§4.1 step 7).
    pub standardize_per_partner: bool,
    /// Gap applied when partitioning a split partner's window (§4.1 step 8).
    pub split_gap_s: Seconds,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            global_reposition_level: None,
            flexibility: None,
            standardize_per_partner: false,
            split_gap_s: 3 * 3600,
        }
    }
}

pub struct FrequencyOutcome {
    pub frequencies: HashMap<PartnerId, u32>,
    /// Reposition frequency `fr_a` per asset (§4.1 step 4), kept alongside
    /// the final value so reporting can show both columns. Split halves
    /// carry their own `f(a_A)`/`f(a_B)` here too, since they are already
    /// capacity-derived and never pass through the reposition step.
    pub reposition_frequencies: HashMap<PartnerId, u32>,
    pub assets: Vec<Asset>,
    pub partners: Vec<Partner>,
}

/// Weekly rate `w_ak = Σ consumed / Σ (days/7)` (§4.1 step 1).
fn aggregate_weekly_rate(consumption: &[ConsumptionRecord]) -> HashMap<(PartnerId, String), f64> {
    let mut consumed_sum: HashMap<(PartnerId, String), f64> = HashMap::new();
    let mut days_sum: HashMap<(PartnerId, String), i64> = HashMap::new();
    for rec in consumption {
        let key = (rec.asset, rec.sku.clone());
        *consumed_sum.entry(key.clone()).or_insert(0.0) += rec.consumed;
        *days_sum.entry(key).or_insert(0) += rec.days();
    }
    consumed_sum
        .into_iter()
        .map(|(key, consumed)| {
            let days = *days_sum.get(&key).unwrap_or(&1).max(&1);
            (key, consumed / (days as f64 / 7.0))
        })
        .collect()
}

fn consumption_frequency(weekly_rate: f64, capacity: f64, reposition_level: f64) -> u32 {
    let usable = capacity * (1.0 - reposition_level);
    if usable <= 0.0 {
        return 0;
    }
    (weekly_rate / usable).ceil().max(0.0) as u32
}

pub fn compute_frequencies(
    assets: &[Asset],
    partners: &[Partner],
    sku_lines: &[SkuLine],
    consumption: &[ConsumptionRecord],
    config: &FrequencyConfig,
) -> FieldOpsResult<(FrequencyOutcome, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let weekly_rate = aggregate_weekly_rate(consumption);

    // §4.1 steps 2-3: per-SKU-line frequency, collapsed to one value per asset.
    let mut fc_a: HashMap<PartnerId, u32> = HashMap::new();
    for line in sku_lines {
        let rate = weekly_rate
            .get(&(line.asset, line.sku.clone()))
            .copied()
            .unwrap_or(0.0); // missing consumption => zero rate (§4.1 failure semantics)
        let reposition = config.global_reposition_level.unwrap_or(line.reposition_level);
        let fc_ak = consumption_frequency(rate, line.capacity, reposition);
        let entry = fc_a.entry(line.asset).or_insert(0);
        *entry = (*entry).max(fc_ak);
    }

    let asset_by_id: HashMap<PartnerId, &Asset> = assets.iter().map(|a| (a.id, a)).collect();

    // §4.1 steps 4-6: reposition frequency, flexibility, final value.
    let mut final_freq: HashMap<PartnerId, u32> = HashMap::new();
    let mut reposition_freq: HashMap<PartnerId, u32> = HashMap::new();
    for asset in assets {
        let fc = fc_a.get(&asset.id).copied().unwrap_or(0);
        let fr = fc
            .min(asset.days_per_week as u32)
            .min(asset.current_frequency);
        reposition_freq.insert(asset.id, fr);
        let fmin_prime = match config.flexibility {
            Some(flex) => asset
                .min_frequency
                .max(asset.current_frequency.saturating_sub(flex)),
            None => asset.min_frequency,
        };
        let f = fmin_prime.max(fr);
        final_freq.insert(asset.id, f);
    }

    // §4.1 step 7: intra-partner standardization.
    if config.standardize_per_partner {
        let mut max_per_partner: HashMap<PartnerId, u32> = HashMap::new();
        for asset in assets {
            let f = final_freq[&asset.id];
            let entry = max_per_partner.entry(asset.partner).or_insert(0);
            *entry = (*entry).max(f);
        }
        for asset in assets {
            let standardized = max_per_partner[&asset.partner];
            final_freq.insert(asset.id, standardized);
        }
    }

    // §4.1 step 8: repasses (A/B split).
    let partner_by_id: HashMap<PartnerId, &Partner> = partners.iter().map(|p| (p.id, p)).collect();
    let mut rewritten_assets = Vec::new();
    let mut rewritten_partners: HashMap<PartnerId, Partner> =
        partners.iter().map(|p| (p.id, p.clone())).collect();
    let mut split_partner_ids: Vec<PartnerId> = Vec::new();
    let mut output_freq: HashMap<PartnerId, u32> = HashMap::new();
    let mut output_reposition: HashMap<PartnerId, u32> = HashMap::new();

    for asset in assets {
        let fc = fc_a.get(&asset.id).copied().unwrap_or(0);
        let eligible = asset.split_eligible && (fc as f64) > 1.5 * asset.days_per_week as f64;
        if !eligible {
            output_freq.insert(asset.id, final_freq[&asset.id]);
            output_reposition.insert(asset.id, reposition_freq[&asset.id]);
            rewritten_assets.push(asset.clone());
            continue;
        }

        let parent_asset_key = asset.id.parent();
        let asset_a_id = PartnerId::split(parent_asset_key, Half::A);
        let asset_b_id = PartnerId::split(parent_asset_key, Half::B);

        let f_a = asset.days_per_week as u32;
        let f_b = fc.saturating_sub(asset.days_per_week as u32);
        let fmin_half = asset.min_frequency.div_ceil(2);

        let Some(partner) = partner_by_id.get(&asset.partner) else {
            diagnostics.add_warning_with_entity(
                "split",
                "asset references unknown partner; split skipped",
                asset.id.to_string(),
            );
            output_freq.insert(asset.id, final_freq[&asset.id]);
            output_reposition.insert(asset.id, reposition_freq[&asset.id]);
            rewritten_assets.push(asset.clone());
            continue;
        };

        let parent_partner_key = partner.id.parent();
        let partner_a_id = PartnerId::split(parent_partner_key, Half::A);
        let partner_b_id = PartnerId::split(parent_partner_key, Half::B);

        let (window_a, window_b) = split_window(&partner.window, config.split_gap_s, &mut diagnostics, partner.id);

        let mut partner_a = (*partner).clone();
        partner_a.id = partner_a_id;
        partner_a.window = window_a;
        let mut partner_b = (*partner).clone();
        partner_b.id = partner_b_id;
        partner_b.window = window_b;

        rewritten_partners.remove(&asset.partner);
        rewritten_partners.insert(partner_a_id, partner_a);
        rewritten_partners.insert(partner_b_id, partner_b);
        split_partner_ids.push(partner.id);

        let mut asset_a = asset.clone();
        asset_a.id = asset_a_id;
        asset_a.partner = partner_a_id;
        asset_a.min_frequency = fmin_half;
        asset_a.current_frequency = f_a;

        let mut asset_b = asset.clone();
        asset_b.id = asset_b_id;
        asset_b.partner = partner_b_id;
        asset_b.min_frequency = fmin_half;
        asset_b.current_frequency = f_b;

        output_freq.insert(asset_a_id, f_a);
        output_freq.insert(asset_b_id, f_b);
        output_reposition.insert(asset_a_id, f_a);
        output_reposition.insert(asset_b_id, f_b);
        rewritten_assets.push(asset_a);
        rewritten_assets.push(asset_b);
    }

    let _ = asset_by_id; // retained for readability of lookup intent above

    let partners_out: Vec<Partner> = rewritten_partners.into_values().collect();

    Ok((
        FrequencyOutcome {
            frequencies: output_freq,
            reposition_frequencies: output_reposition,
            assets: rewritten_assets,
            partners: partners_out,
        },
        diagnostics,
    ))
}

/// Partition a partner's opening window into two halves separated by a gap
/// (§4.1 step 8). Shrinks the gap and warns rather than producing an empty
/// window (§7 split-window degeneracy).
fn split_window(
    window: &TimeWindow,
    requested_gap: Seconds,
    diagnostics: &mut Diagnostics,
    partner: PartnerId,
) -> (TimeWindow, TimeWindow) {
    let duration = window.duration();
    let mut gap = requested_gap.min(duration - 60);
    if duration <= requested_gap + 60 {
        gap = (duration - 60).max(0);
        diagnostics.add_warning_with_entity(
            "split-window",
            format!(
                "window too narrow for requested gap ({requested_gap}s); reduced to {gap}s"
            ),
            partner.to_string(),
        );
    }
    let midpoint = window.open + (duration - gap) / 2;
    let a = TimeWindow::new(window.open, midpoint);
    let b = TimeWindow::new(midpoint + gap, window.close);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::{BranchId, SupervisorId};

    fn partner(id: u64) -> Partner {
        Partner {
            id: PartnerId::original(id),
            branch: BranchId::new(1),
            window: TimeWindow::new(0, 10 * 3600),
            entry_time_s: 300,
            fixed_weekday: None,
            supervisor: SupervisorId::new(1),
            point_id: format!("pt{id}"),
            lat: -23.5,
            lon: -46.6,
        }
    }

    fn asset(id: u64, partner_id: u64, min_freq: u32, cur_freq: u32, split_eligible: bool) -> Asset {
        Asset {
            id: PartnerId::original(id),
            partner: PartnerId::original(partner_id),
            service_time_s: 600,
            days_per_week: 5,
            min_frequency: min_freq,
            current_frequency: cur_freq,
            split_eligible,
        }
    }

    #[test]
    fn scenario_c_split_produces_dpw_and_remainder() {
        // fc_a=12, dpw_a=5, split_eligible=S -> f(a_A)=5, f(a_B)=7.
        let partners = vec![partner(1)];
        let assets = vec![asset(1, 1, 1, 12, true)];
        let sku_lines = vec![SkuLine {
            asset: PartnerId::original(1),
            sku: "coffee".into(),
            capacity: 1.0,
            reposition_level: 0.0,
        }];
        // Weekly rate chosen so ceil(rate/capacity) == 12.
        let consumption = vec![ConsumptionRecord {
            branch: BranchId::new(1),
            partner: PartnerId::original(1),
            asset: PartnerId::original(1),
            sku: "coffee".into(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 8).unwrap(),
            consumed: 12.0,
        }];
        let config = FrequencyConfig {
            split_gap_s: 3 * 3600,
            ..Default::default()
        };
        let (outcome, _diag) =
            compute_frequencies(&assets, &partners, &sku_lines, &consumption, &config).unwrap();

        let a_half = PartnerId::split(1, Half::A);
        let b_half = PartnerId::split(1, Half::B);
        assert_eq!(outcome.frequencies[&a_half], 5);
        assert_eq!(outcome.frequencies[&b_half], 7);
        assert_eq!(outcome.frequencies[&a_half] + outcome.frequencies[&b_half], 12);

        let partner_a = outcome
            .partners
            .iter()
            .find(|p| p.id == PartnerId::split(1, Half::A))
            .unwrap();
        let partner_b = outcome
            .partners
            .iter()
            .find(|p| p.id == PartnerId::split(1, Half::B))
            .unwrap();
        // Scenario C: 10h window, 3h gap -> A=[0, 3.5h], B=[6.5h, 10h].
        assert_eq!(partner_a.window.open, 0);
        assert_eq!(partner_a.window.close, (3.5 * 3600.0) as i64);
        assert_eq!(partner_b.window.open, (6.5 * 3600.0) as i64);
        assert_eq!(partner_b.window.close, 10 * 3600);
    }

    #[test]
    fn missing_consumption_defaults_to_zero_rate() {
        let partners = vec![partner(1)];
        let assets = vec![asset(1, 1, 1, 3, false)];
        let sku_lines = vec![SkuLine {
            asset: PartnerId::original(1),
            sku: "coffee".into(),
            capacity: 1.0,
            reposition_level: 0.0,
        }];
        let (outcome, _) =
            compute_frequencies(&assets, &partners, &sku_lines, &[], &FrequencyConfig::default())
                .unwrap();
        // fc_a = 0 (no consumption); fr_a = min(0, 5, 3) = 0; f_a = max(fmin=1, 0) = 1.
        assert_eq!(outcome.frequencies[&PartnerId::original(1)], 1);
    }

    #[test]
    fn non_eligible_asset_is_not_split_even_above_threshold() {
        let partners = vec![partner(1)];
        let assets = vec![asset(1, 1, 1, 12, false)];
        let sku_lines = vec![SkuLine {
            asset: PartnerId::original(1),
            sku: "coffee".into(),
            capacity: 1.0,
            reposition_level: 0.0,
        }];
        let consumption = vec![ConsumptionRecord {
            branch: BranchId::new(1),
            partner: PartnerId::original(1),
            asset: PartnerId::original(1),
            sku: "coffee".into(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 8).unwrap(),
            consumed: 12.0,
        }];
        let (outcome, _) = compute_frequencies(
            &assets,
            &partners,
            &sku_lines,
            &consumption,
            &FrequencyConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.assets.len(), 1);
        assert!(!outcome.assets[0].id.is_split());
    }
}
