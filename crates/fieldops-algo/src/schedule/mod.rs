//! S2 Weekly Scheduler (§4.2): assign each asset to a visit pattern by
//! solving a min-max MIP, independently per branch.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fieldops_core::{BranchId, Diagnostics, FieldOpsError, FieldOpsResult, PartnerId};
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel};

pub type WeekdaySet = BTreeSet<u8>;

#[derive(Debug, Clone)]
pub struct AssetDemand {
    pub asset: PartnerId,
    pub partner: PartnerId,
    pub frequency: u32,
    pub allow_saturday: bool,
}

#[derive(Debug, Clone)]
pub struct BranchScheduleInput {
    pub branch: BranchId,
    pub weekly_days: u8,
    pub assets: Vec<AssetDemand>,
    /// Partner -> fixed weekday (§3, §4.2 constraint iii), restricted to
    /// partners that actually have assets in this branch.
    pub fixed_weekdays: HashMap<PartnerId, u8>,
}

/// Build the evenly-spaced pattern catalog for `(weekly_days, frequency)`
/// (§4.2 "Pattern catalog construction"): the canonical base rotated
/// through every start offset, deduplicated as sets.
pub fn pattern_catalog(weekly_days: u8, frequency: u32) -> Vec<WeekdaySet> {
    if frequency == 0 || frequency as u8 > weekly_days {
        return Vec::new();
    }
    let dw = weekly_days as f64;
    let f = frequency as f64;
    let canonical: Vec<u8> = (0..frequency)
        .map(|i| ((i as f64 * dw / f).round() as i64).rem_euclid(weekly_days as i64) as u8)
        .collect();

    let mut catalog: Vec<WeekdaySet> = Vec::new();
    for rotation in 0..weekly_days {
        let rotated: WeekdaySet = canonical
            .iter()
            .map(|&d| (d + rotation) % weekly_days)
            .collect();
        if !catalog.contains(&rotated) {
            catalog.push(rotated);
        }
    }
    catalog
}

struct CandidatePattern {
    asset: PartnerId,
    pattern: WeekdaySet,
    var: good_lp::Variable,
}

pub fn solve_branch_schedule(
    input: &BranchScheduleInput,
) -> FieldOpsResult<(HashMap<PartnerId, WeekdaySet>, Diagnostics)> {
    match solve_with_fixed_weekdays(input, true) {
        Ok(result) => Ok(result),
        Err(_) if !input.fixed_weekdays.is_empty() => {
            let mut diagnostics = Diagnostics::new();
            for partner in input.fixed_weekdays.keys() {
                diagnostics.add_warning_with_entity(
                    "schedule-degrade",
                    "fixed-weekday constraint relaxed after infeasibility",
                    partner.to_string(),
                );
            }
            let (assignment, mut inner_diag) = solve_with_fixed_weekdays(input, false)?;
            inner_diag.merge(diagnostics);
            Ok((assignment, inner_diag))
        }
        Err(e) => Err(e),
    }
}

fn solve_with_fixed_weekdays(
    input: &BranchScheduleInput,
    enforce_fixed: bool,
) -> FieldOpsResult<(HashMap<PartnerId, WeekdaySet>, Diagnostics)> {
    let diagnostics = Diagnostics::new();
    let mut vars = ProblemVariables::new();

    let mut candidates: Vec<CandidatePattern> = Vec::new();
    let mut by_asset: BTreeMap<PartnerId, Vec<usize>> = BTreeMap::new();
    let mut by_partner_weekday: HashMap<(PartnerId, u8), Vec<usize>> = HashMap::new();

    for demand in &input.assets {
        let mut catalog = pattern_catalog(input.weekly_days, demand.frequency);
        if !demand.allow_saturday {
            catalog.retain(|pattern| !pattern.contains(&5));
        }
        if catalog.is_empty() {
            return Err(FieldOpsError::ScheduleInfeasible {
                branch: input.branch,
                message: format!(
                    "asset {} has no feasible pattern for frequency {} (allow_saturday={})",
                    demand.asset, demand.frequency, demand.allow_saturday
                ),
            });
        }
        for pattern in catalog {
            let idx = candidates.len();
            let var = vars.add(variable().binary());
            for &day in &pattern {
                by_partner_weekday
                    .entry((demand.partner, day))
                    .or_default()
                    .push(idx);
            }
            by_asset.entry(demand.asset).or_default().push(idx);
            candidates.push(CandidatePattern {
                asset: demand.asset,
                pattern,
                var,
            });
        }
    }

    let peak = vars.add(variable().min(0.0));

    let mut model = vars.minimise(peak).using(good_lp::solvers::highs::highs);

    // (i) each asset picks exactly one pattern.
    for indices in by_asset.values() {
        let sum: Expression = indices.iter().map(|&i| candidates[i].var).sum();
        model = model.with(constraint!(sum == 1.0));
    }

    // (ii) per-weekday load is bounded above by the peak variable.
    for day in 0..input.weekly_days {
        let mut load: Expression = 0.into();
        for candidate in &candidates {
            if candidate.pattern.contains(&day) {
                load += candidate.var;
            }
        }
        model = model.with(constraint!(load <= peak));
    }

    // (iii) fixed-weekday partners must have at least one pattern covering t*.
    if enforce_fixed {
        for (&partner, &fixed_day) in &input.fixed_weekdays {
            if let Some(indices) = by_partner_weekday.get(&(partner, fixed_day)) {
                let sum: Expression = indices.iter().map(|&i| candidates[*i].var).sum();
                model = model.with(constraint!(sum >= 1.0));
            }
        }
    }

    let solution = model
        .solve()
        .map_err(|e| FieldOpsError::ScheduleInfeasible {
            branch: input.branch,
            message: e.to_string(),
        })?;

    let mut assignment: HashMap<PartnerId, WeekdaySet> = HashMap::new();
    for candidate in &candidates {
        if solution.value(candidate.var) > 0.5 {
            assignment.insert(candidate.asset, candidate.pattern.clone());
        }
    }

    Ok((assignment, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_catalog_is_idempotent() {
        // Invariant 7 (§8): recomputing yields an identical set.
        let a = pattern_catalog(5, 2);
        let b = pattern_catalog(5, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn pattern_catalog_respects_frequency_and_range() {
        let catalog = pattern_catalog(5, 2);
        assert!(!catalog.is_empty());
        for pattern in &catalog {
            assert_eq!(pattern.len(), 2);
            assert!(pattern.iter().all(|&d| d < 5));
        }
    }

    #[test]
    fn pattern_catalog_empty_when_frequency_exceeds_days() {
        assert!(pattern_catalog(5, 6).is_empty());
    }

    #[test]
    fn scenario_b_saturday_gating_is_infeasible_without_saturday() {
        let input = BranchScheduleInput {
            branch: BranchId::new(1),
            weekly_days: 6,
            assets: vec![AssetDemand {
                asset: PartnerId::original(1),
                partner: PartnerId::original(1),
                frequency: 6,
                allow_saturday: false,
            }],
            fixed_weekdays: HashMap::new(),
        };
        let err = solve_branch_schedule(&input).unwrap_err();
        assert!(err.to_string().contains("1"));
    }
}
