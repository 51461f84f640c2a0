//! End-to-end S1→S4 orchestration (§2, §5, §10.4): wires the four stages
//! together, running each stage's independent subproblems on a bounded
//! rayon thread pool and collecting a [`JobRecord`] per subproblem
//! (§6 "Exit behavior").
//!
//! Parallelism follows §5: S2 is independent per branch, S3 per
//! `(branch, supervisor, day)`, S4 per `(branch, supervisor)`. There is no
//! shared mutable state across workers — each closure below only reads its
//! slice of the already-ingested, already-split dataset and returns an
//! owned result that the caller collects.
//!
//! 1-to-1 mode (§4.3 "weekly consolidation mode", §4.4 "1-to-1 mode") takes
//! a different shape: routing runs once per `(branch, supervisor)` over the
//! whole week's visits with vehicle capacity pinned to the weekly budget
//! instead of once per day, and S4 is a pass-through (each solved route is
//! already one agent). The capacity retry loop (§7, §9) only applies here.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use fieldops_algo::freq::{compute_frequencies, FrequencyConfig};
use fieldops_algo::match_::{match_routes, AgentBundle, MatcherConfig, RouteSummary};
use fieldops_algo::route::{
    assign_scale_tier, build_groups, solve_day, AssetVisit, DailyRoutingOutcome, Group,
    RouterConfig, TravelLookup,
};
use fieldops_algo::schedule::{solve_branch_schedule, AssetDemand, BranchScheduleInput, WeekdaySet};
use fieldops_core::{
    Asset, Branch, BranchId, ConsumptionRecord, Diagnostics, FieldOpsError, FieldOpsResult,
    Partner, PartnerId, SkuLine, SupervisorId, TravelMatrixRow,
};

use crate::job::{JobRecord, StageKind};
use crate::retry::{fold_until_converged, RetryParams};

/// Everything the pipeline needs that ingest (§6) is responsible for
/// producing: raw entity tables plus the per-branch operational parameters.
pub struct PipelineInput {
    pub assets: Vec<Asset>,
    pub partners: Vec<Partner>,
    pub sku_lines: Vec<SkuLine>,
    pub consumption: Vec<ConsumptionRecord>,
    pub branches: HashMap<BranchId, Branch>,
    pub driving_matrix: Vec<TravelMatrixRow>,
    pub walking_matrix: Vec<TravelMatrixRow>,
}

/// Tuning knobs read from `Config` (§6, §10.3), decoupled from the TOML
/// shape so this crate stays independent of `fieldops-io`'s wire format.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub freq: FrequencyConfig,
    pub router: RouterConfig,
    pub scale_tiers_s: Vec<(String, i64)>,
    pub weekly_budget_s: i64,
    pub replacement_percentile: f64,
    /// `true` runs S3 in weekly-consolidation mode and S4 in 1-to-1
    /// pass-through mode (§4.3, §4.4); also the only mode the capacity
    /// retry loop applies to (§7).
    pub one_to_one: bool,
    /// `0` sizes the pool to the available core count (§5, §10.4).
    pub threads: usize,
}

#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub route_id: String,
    pub branch: BranchId,
    pub supervisor: SupervisorId,
    pub day: u8,
    pub result: fieldops_algo::route::RouteResult,
    pub hour_tier: String,
    pub fte: f64,
    pub assets: Vec<PartnerId>,
    pub partners: Vec<PartnerId>,
}

pub struct PipelineOutput {
    pub frequencies: HashMap<PartnerId, u32>,
    pub reposition_frequencies: HashMap<PartnerId, u32>,
    pub assets: Vec<Asset>,
    pub partners: Vec<Partner>,
    pub schedule: HashMap<PartnerId, WeekdaySet>,
    pub routes: Vec<RouteRecord>,
    pub infeasible_groups: Vec<String>,
    pub bundles: HashMap<(BranchId, SupervisorId), Vec<AgentBundle>>,
    pub jobs: Vec<JobRecord>,
    pub diagnostics: Diagnostics,
}

fn build_thread_pool(threads: usize) -> FieldOpsResult<rayon::ThreadPool> {
    let count = if threads == 0 { num_cpus::get() } else { threads };
    ThreadPoolBuilder::new()
        .num_threads(count)
        .build()
        .map_err(|e| FieldOpsError::Config(format!("building worker pool: {e}")))
}

pub fn run_pipeline(
    input: PipelineInput,
    settings: &PipelineSettings,
) -> FieldOpsResult<PipelineOutput> {
    let pool = build_thread_pool(settings.threads)?;
    pool.install(|| run_pipeline_inner(input, settings))
}

fn run_pipeline_inner(
    input: PipelineInput,
    settings: &PipelineSettings,
) -> FieldOpsResult<PipelineOutput> {
    let mut jobs = Vec::new();
    let mut diagnostics = Diagnostics::new();

    // --- S1: Frequency Engine (§4.1) ---
    let (freq_outcome, freq_diag) = compute_frequencies(
        &input.assets,
        &input.partners,
        &input.sku_lines,
        &input.consumption,
        &settings.freq,
    )?;
    diagnostics.merge(freq_diag);

    let partners_by_id: HashMap<PartnerId, Partner> = freq_outcome
        .partners
        .iter()
        .map(|p| (p.id, p.clone()))
        .collect();

    // --- S2: Weekly Scheduler, independent per branch (§4.2, §5) ---
    let branch_inputs = build_branch_schedule_inputs(
        &freq_outcome.assets,
        &partners_by_id,
        &freq_outcome.frequencies,
        &input.branches,
    );

    let schedule_results: Vec<(BranchId, FieldOpsResult<(HashMap<PartnerId, WeekdaySet>, Diagnostics)>)> =
        branch_inputs
            .par_iter()
            .map(|branch_input| (branch_input.branch, solve_branch_schedule(branch_input)))
            .collect();

    let mut schedule: HashMap<PartnerId, WeekdaySet> = HashMap::new();
    for (branch, result) in schedule_results {
        match result {
            Ok((assignment, diag)) => {
                jobs.push(JobRecord::ok(
                    format!("s2-schedule-{branch}"),
                    StageKind::Schedule,
                    diag.warning_count(),
                ));
                diagnostics.merge(diag);
                schedule.extend(assignment);
            }
            Err(e) => {
                jobs.push(JobRecord::error(format!("s2-schedule-{branch}"), StageKind::Schedule, &e));
                return Err(e);
            }
        }
    }

    let travel_by_branch =
        build_travel_lookups(&input.branches, &input.driving_matrix, &input.walking_matrix);

    let (routes, infeasible_groups, bundles, s3_s4_jobs) = if settings.one_to_one {
        run_weekly_consolidated(
            &freq_outcome.assets,
            &partners_by_id,
            &freq_outcome.frequencies,
            &schedule,
            &input.branches,
            &travel_by_branch,
            settings,
            &mut diagnostics,
        )?
    } else {
        run_daily_routing_and_matching(
            &freq_outcome.assets,
            &partners_by_id,
            &freq_outcome.frequencies,
            &schedule,
            &input.branches,
            &travel_by_branch,
            settings,
            &mut diagnostics,
        )?
    };
    jobs.extend(s3_s4_jobs);

    Ok(PipelineOutput {
        frequencies: freq_outcome.frequencies,
        reposition_frequencies: freq_outcome.reposition_frequencies,
        assets: freq_outcome.assets,
        partners: freq_outcome.partners,
        schedule,
        routes,
        infeasible_groups,
        bundles,
        jobs,
        diagnostics,
    })
}

type StageResult = FieldOpsResult<(
    Vec<RouteRecord>,
    Vec<String>,
    HashMap<(BranchId, SupervisorId), Vec<AgentBundle>>,
    Vec<JobRecord>,
)>;

/// Default (non-1-to-1) shape: S3 solved independently per
/// `(branch, supervisor, day)`, then S4 bundles routes per
/// `(branch, supervisor)` with the similarity heuristic (§4.3, §4.4, §5).
#[allow(clippy::too_many_arguments)]
fn run_daily_routing_and_matching(
    assets: &[Asset],
    partners_by_id: &HashMap<PartnerId, Partner>,
    frequencies: &HashMap<PartnerId, u32>,
    schedule: &HashMap<PartnerId, WeekdaySet>,
    branches: &HashMap<BranchId, Branch>,
    travel_by_branch: &HashMap<BranchId, TravelLookup>,
    settings: &PipelineSettings,
    diagnostics: &mut Diagnostics,
) -> StageResult {
    let mut jobs = Vec::new();

    let day_keys = build_routing_keys(assets, partners_by_id, schedule, branches);
    let visits_by_key = build_visits_by_key(assets, partners_by_id, frequencies, schedule);

    let route_outcomes: Vec<(
        (BranchId, SupervisorId, u8),
        FieldOpsResult<(DailyRoutingOutcome, Vec<Group>, Diagnostics)>,
    )> = day_keys
        .par_iter()
        .map(|key| {
            let &(branch_id, supervisor, day) = key;
            let result = (|| {
                let branch = branches.get(&branch_id).ok_or_else(|| {
                    FieldOpsError::Config(format!("unknown branch {branch_id} in routing key"))
                })?;
                let travel = travel_by_branch.get(&branch_id).ok_or_else(|| {
                    FieldOpsError::Config(format!("no travel matrix loaded for branch {branch_id}"))
                })?;
                let empty = Vec::new();
                let visits = visits_by_key.get(key).unwrap_or(&empty);
                let partners_for_branch = partners_in_branch(partners_by_id, branch_id);
                let groups = build_groups(day, branch.max_time_s, &partners_for_branch, visits);
                let (outcome, diag) = solve_day(&groups, travel, branch, day, &settings.router);
                if outcome.routes.is_empty()
                    && !outcome.infeasible_groups.is_empty()
                    && groups.len() == outcome.infeasible_groups.len()
                {
                    return Err(FieldOpsError::RoutingTimeout {
                        branch: branch_id,
                        supervisor,
                        day,
                    });
                }
                Ok((outcome, groups, diag))
            })();
            (*key, result)
        })
        .collect();

    let mut routes: Vec<RouteRecord> = Vec::new();
    let mut infeasible_groups: Vec<String> = Vec::new();
    let mut routes_by_bs: HashMap<(BranchId, SupervisorId), Vec<RouteSummary>> = HashMap::new();

    for (key, result) in route_outcomes {
        let (branch_id, supervisor, day) = key;
        match result {
            Ok((outcome, groups, diag)) => {
                jobs.push(JobRecord::ok(
                    format!("s3-route-{branch_id}-{supervisor}-d{day}"),
                    StageKind::Route,
                    diag.warning_count(),
                ));
                diagnostics.merge(diag);
                infeasible_groups.extend(outcome.infeasible_groups.clone());

                let branch = &branches[&branch_id];
                append_route_records(
                    &outcome,
                    &groups,
                    branch,
                    branch_id,
                    supervisor,
                    day,
                    settings,
                    &mut routes,
                    &mut routes_by_bs,
                );
            }
            Err(e) => {
                jobs.push(JobRecord::error(
                    format!("s3-route-{branch_id}-{supervisor}-d{day}"),
                    StageKind::Route,
                    &e,
                ));
                return Err(e);
            }
        }
    }

    // --- S4: Agent Matcher, independent per (branch, supervisor) (§4.4, §5) ---
    let bs_keys: Vec<(BranchId, SupervisorId)> = routes_by_bs.keys().copied().collect();
    let match_results: Vec<((BranchId, SupervisorId), Vec<AgentBundle>)> = bs_keys
        .par_iter()
        .map(|&(branch_id, supervisor)| {
            let branch = &branches[&branch_id];
            let summaries = &routes_by_bs[&(branch_id, supervisor)];
            let config = MatcherConfig {
                dmax_m: branch.max_dist_m,
                one_to_one: false,
                weekly_tmax_s: settings.weekly_budget_s,
            };
            ((branch_id, supervisor), match_routes(summaries, &config))
        })
        .collect();

    let mut bundles: HashMap<(BranchId, SupervisorId), Vec<AgentBundle>> = HashMap::new();
    for (key, agent_bundles) in match_results {
        jobs.push(JobRecord::ok(
            format!("s4-match-{}-{}", key.0, key.1),
            StageKind::Match,
            0,
        ));
        bundles.insert(key, agent_bundles);
    }

    Ok((routes, infeasible_groups, bundles, jobs))
}

/// 1-to-1 shape: one weekly-consolidated VRPTW per `(branch, supervisor)`,
/// vehicle capacity pinned to the (possibly retried) weekly budget; S4 is a
/// pass-through since each produced route is already one agent (§4.3, §4.4).
#[allow(clippy::too_many_arguments)]
fn run_weekly_consolidated(
    assets: &[Asset],
    partners_by_id: &HashMap<PartnerId, Partner>,
    frequencies: &HashMap<PartnerId, u32>,
    schedule: &HashMap<PartnerId, WeekdaySet>,
    branches: &HashMap<BranchId, Branch>,
    travel_by_branch: &HashMap<BranchId, TravelLookup>,
    settings: &PipelineSettings,
    diagnostics: &mut Diagnostics,
) -> StageResult {
    let mut jobs = Vec::new();

    let visits_by_bs = build_weekly_visits_by_bs(assets, partners_by_id, frequencies, schedule);
    let bs_keys: Vec<(BranchId, SupervisorId)> = visits_by_bs.keys().copied().collect();

    let outcomes: Vec<((BranchId, SupervisorId), FieldOpsResult<(Vec<RouteRecord>, Vec<String>, Diagnostics)>)> =
        bs_keys
            .par_iter()
            .map(|&(branch_id, supervisor)| {
                let result = (|| {
                    let branch = branches.get(&branch_id).ok_or_else(|| {
                        FieldOpsError::Config(format!("unknown branch {branch_id} in weekly routing key"))
                    })?;
                    let travel = travel_by_branch.get(&branch_id).ok_or_else(|| {
                        FieldOpsError::Config(format!("no travel matrix loaded for branch {branch_id}"))
                    })?;
                    let partners_for_branch = partners_in_branch(partners_by_id, branch_id);
                    let visits = &visits_by_bs[&(branch_id, supervisor)];
                    solve_weekly_with_retry(
                        branch_id,
                        supervisor,
                        branch,
                        travel,
                        &partners_for_branch,
                        visits,
                        settings,
                    )
                })();
                ((branch_id, supervisor), result)
            })
            .collect();

    let mut routes: Vec<RouteRecord> = Vec::new();
    let mut infeasible_groups: Vec<String> = Vec::new();
    let mut bundles: HashMap<(BranchId, SupervisorId), Vec<AgentBundle>> = HashMap::new();

    for (key, result) in outcomes {
        match result {
            Ok((week_routes, infeasible, diag)) => {
                jobs.push(JobRecord::ok(
                    format!("s3-route-week-{}-{}", key.0, key.1),
                    StageKind::Route,
                    diag.warning_count(),
                ));
                diagnostics.merge(diag);
                infeasible_groups.extend(infeasible);

                let agent_bundles: Vec<AgentBundle> = week_routes
                    .iter()
                    .map(|r| AgentBundle {
                        routes: vec![r.route_id.clone()],
                        is_full_time: r.fte >= 1.0,
                        hours_s: r.result.total_time_s,
                        fte: r.fte,
                    })
                    .collect();
                jobs.push(JobRecord::ok(
                    format!("s4-match-{}-{}", key.0, key.1),
                    StageKind::Match,
                    0,
                ));
                bundles.insert(key, agent_bundles);
                routes.extend(week_routes);
            }
            Err(e) => {
                jobs.push(JobRecord::error(
                    format!("s3-route-week-{}-{}", key.0, key.1),
                    StageKind::Route,
                    &e,
                ));
                return Err(e);
            }
        }
    }

    Ok((routes, infeasible_groups, bundles, jobs))
}

/// §7/§9: the first attempt solves against the branch's ordinary daily cap
/// (the weekly-budget ceiling not yet enforced); each subsequent attempt
/// enforces the shrinking weekly budget directly as the route-time cap.
/// Convergence is judged against the original (unshrunk) budget inflated by
/// the current replacement percentile (§7 "Scenario F: terminate when ≤44h").
#[allow(clippy::too_many_arguments)]
fn solve_weekly_with_retry(
    branch_id: BranchId,
    supervisor: SupervisorId,
    branch: &Branch,
    travel: &TravelLookup,
    partners: &HashMap<PartnerId, Partner>,
    visits: &[AssetVisit],
    settings: &PipelineSettings,
) -> FieldOpsResult<(Vec<RouteRecord>, Vec<String>, Diagnostics)> {
    let initial = RetryParams {
        weekly_budget_s: settings.weekly_budget_s,
        replacement_percentile: settings.replacement_percentile,
    };
    let target_s = initial.weekly_budget_s;

    fold_until_converged(branch_id, initial, |params, iteration| {
        let cap = if iteration == 0 {
            branch.max_time_s.max(target_s)
        } else {
            params.weekly_budget_s
        };
        let week_branch = Branch {
            max_time_s: cap,
            saturday_max_time_s: None,
            ..branch.clone()
        };
        let groups = build_groups(0, cap, partners, visits);
        let (outcome, diag) = solve_day(&groups, travel, &week_branch, 0, &settings.router);

        let worst = outcome
            .routes
            .iter()
            .map(|r| r.total_time_s)
            .max()
            .unwrap_or(0) as f64
            * params.inflation_factor();

        if worst > target_s as f64 {
            return Ok(None);
        }

        let mut week_routes = Vec::new();
        let mut routes_by_bs = HashMap::new();
        append_route_records(
            &outcome,
            &groups,
            &week_branch,
            branch_id,
            supervisor,
            0,
            settings,
            &mut week_routes,
            &mut routes_by_bs,
        );
        Ok(Some((week_routes, outcome.infeasible_groups, diag)))
    })
}

fn partners_in_branch(
    partners_by_id: &HashMap<PartnerId, Partner>,
    branch_id: BranchId,
) -> HashMap<PartnerId, Partner> {
    partners_by_id
        .iter()
        .filter(|(_, p)| p.branch == branch_id)
        .map(|(id, p)| (*id, p.clone()))
        .collect()
}

/// Converts a solved day's routes into [`RouteRecord`]s and, if `by_bs` is
/// tracked, the matcher's [`RouteSummary`] view of the same routes.
#[allow(clippy::too_many_arguments)]
fn append_route_records(
    outcome: &DailyRoutingOutcome,
    groups: &[Group],
    branch: &Branch,
    branch_id: BranchId,
    supervisor: SupervisorId,
    day: u8,
    settings: &PipelineSettings,
    routes: &mut Vec<RouteRecord>,
    routes_by_bs: &mut HashMap<(BranchId, SupervisorId), Vec<RouteSummary>>,
) {
    let groups_by_id: HashMap<&str, &Group> = groups.iter().map(|g| (g.id.as_str(), g)).collect();

    for (idx, result) in outcome.routes.iter().enumerate() {
        let route_id = format!("R-b{branch_id}-s{supervisor}-d{day}-{idx}");
        let member_groups: Vec<&Group> = result
            .group_ids
            .iter()
            .filter_map(|id| groups_by_id.get(id.as_str()).copied())
            .collect();
        let assets: Vec<PartnerId> = member_groups.iter().flat_map(|g| g.members.clone()).collect();
        let partner_ids: Vec<PartnerId> = member_groups.iter().map(|g| g.partner).collect();
        let (lat, lon) = centroid(&member_groups);
        let tiers = tier_refs(&settings.scale_tiers_s);
        let (hour_tier, fte) = assign_scale_tier(result.total_time_s, &tiers, branch.max_time_s);

        routes.push(RouteRecord {
            route_id: route_id.clone(),
            branch: branch_id,
            supervisor,
            day,
            result: result.clone(),
            hour_tier: hour_tier.clone(),
            fte,
            assets: assets.clone(),
            partners: partner_ids,
        });

        routes_by_bs.entry((branch_id, supervisor)).or_default().push(RouteSummary {
            route_id,
            day,
            modality: result.modality,
            hour_tier,
            is_full_time: fte >= 1.0,
            centroid_lat: lat,
            centroid_lon: lon,
            assets: assets.into_iter().collect::<HashSet<_>>(),
            total_time_s: result.total_time_s,
        });
    }
}

fn tier_refs(tiers: &[(String, i64)]) -> Vec<(&str, i64)> {
    tiers.iter().map(|(n, s)| (n.as_str(), *s)).collect()
}

fn centroid(groups: &[&Group]) -> (f64, f64) {
    if groups.is_empty() {
        return (0.0, 0.0);
    }
    let n = groups.len() as f64;
    let lat = groups.iter().map(|g| g.lat).sum::<f64>() / n;
    let lon = groups.iter().map(|g| g.lon).sum::<f64>() / n;
    (lat, lon)
}

fn build_branch_schedule_inputs(
    assets: &[Asset],
    partners: &HashMap<PartnerId, Partner>,
    frequencies: &HashMap<PartnerId, u32>,
    branches: &HashMap<BranchId, Branch>,
) -> Vec<BranchScheduleInput> {
    let mut by_branch: HashMap<BranchId, Vec<AssetDemand>> = HashMap::new();
    let mut fixed_by_branch: HashMap<BranchId, HashMap<PartnerId, u8>> = HashMap::new();

    for asset in assets {
        let Some(partner) = partners.get(&asset.partner) else { continue };
        let Some(branch) = branches.get(&partner.branch) else { continue };
        let frequency = frequencies.get(&asset.id).copied().unwrap_or(0);
        // allow_saturday_a derived from the asset's own calendar (dpw=6)
        // gated by the branch-wide Saturday policy (§3, §6).
        let allow_saturday = asset.days_per_week == 6 && branch.allow_saturday;
        by_branch.entry(partner.branch).or_default().push(AssetDemand {
            asset: asset.id,
            partner: asset.partner,
            frequency,
            allow_saturday,
        });
        if let Some(fixed_day) = partner.fixed_weekday {
            fixed_by_branch
                .entry(partner.branch)
                .or_default()
                .insert(partner.id, fixed_day);
        }
    }

    by_branch
        .into_iter()
        .filter_map(|(branch_id, demands)| {
            let branch = branches.get(&branch_id)?;
            Some(BranchScheduleInput {
                branch: branch_id,
                weekly_days: branch.weekly_days,
                assets: demands,
                fixed_weekdays: fixed_by_branch.remove(&branch_id).unwrap_or_default(),
            })
        })
        .collect()
}

fn build_routing_keys(
    assets: &[Asset],
    partners: &HashMap<PartnerId, Partner>,
    schedule: &HashMap<PartnerId, WeekdaySet>,
    branches: &HashMap<BranchId, Branch>,
) -> Vec<(BranchId, SupervisorId, u8)> {
    let mut keys: std::collections::BTreeSet<(BranchId, SupervisorId, u8)> = Default::default();
    for asset in assets {
        let Some(partner) = partners.get(&asset.partner) else { continue };
        if !branches.contains_key(&partner.branch) {
            continue;
        }
        if let Some(days) = schedule.get(&asset.id) {
            for &day in days {
                keys.insert((partner.branch, partner.supervisor, day));
            }
        }
    }
    keys.into_iter().collect()
}

fn build_visits_by_key(
    assets: &[Asset],
    partners: &HashMap<PartnerId, Partner>,
    frequencies: &HashMap<PartnerId, u32>,
    schedule: &HashMap<PartnerId, WeekdaySet>,
) -> HashMap<(BranchId, SupervisorId, u8), Vec<AssetVisit>> {
    let mut visits: HashMap<(BranchId, SupervisorId, u8), Vec<AssetVisit>> = HashMap::new();
    for asset in assets {
        let Some(partner) = partners.get(&asset.partner) else { continue };
        let Some(days) = schedule.get(&asset.id) else { continue };
        let frequency = frequencies.get(&asset.id).copied().unwrap_or(0) as i64;
        for &day in days {
            visits
                .entry((partner.branch, partner.supervisor, day))
                .or_default()
                .push(AssetVisit {
                    asset: asset.id,
                    partner: partner.id,
                    service_s: asset.service_time_s,
                    weekly_demand_s: frequency * asset.service_time_s,
                });
        }
    }
    visits
}

/// Same as [`build_visits_by_key`] but merged across every assigned weekday
/// into a single `(branch, supervisor)` pool, for the weekly-consolidated
/// 1-to-1 solve (§4.3 "weekly consolidation mode").
fn build_weekly_visits_by_bs(
    assets: &[Asset],
    partners: &HashMap<PartnerId, Partner>,
    frequencies: &HashMap<PartnerId, u32>,
    schedule: &HashMap<PartnerId, WeekdaySet>,
) -> HashMap<(BranchId, SupervisorId), Vec<AssetVisit>> {
    let mut visits: HashMap<(BranchId, SupervisorId), Vec<AssetVisit>> = HashMap::new();
    for asset in assets {
        let Some(partner) = partners.get(&asset.partner) else { continue };
        if schedule.get(&asset.id).map(|d| d.is_empty()).unwrap_or(true) {
            continue;
        }
        let frequency = frequencies.get(&asset.id).copied().unwrap_or(0) as i64;
        visits
            .entry((partner.branch, partner.supervisor))
            .or_default()
            .push(AssetVisit {
                asset: asset.id,
                partner: partner.id,
                service_s: asset.service_time_s,
                weekly_demand_s: frequency * asset.service_time_s,
            });
    }
    visits
}

fn build_travel_lookups(
    branches: &HashMap<BranchId, Branch>,
    driving: &[TravelMatrixRow],
    walking: &[TravelMatrixRow],
) -> HashMap<BranchId, TravelLookup> {
    branches
        .keys()
        .map(|&branch_id| {
            let d: Vec<TravelMatrixRow> =
                driving.iter().filter(|r| r.branch == branch_id).cloned().collect();
            let w: Vec<TravelMatrixRow> =
                walking.iter().filter(|r| r.branch == branch_id).cloned().collect();
            (branch_id, TravelLookup::new(d, w))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::TimeWindow;

    fn branch(id: u64) -> Branch {
        Branch {
            id: BranchId::new(id),
            weekly_days: 5,
            max_time_s: 8 * 3600,
            max_dist_m: 1_000_000.0,
            traffic_factor: 1.0,
            allow_saturday: false,
            saturday_max_time_s: None,
        }
    }

    fn partner(id: u64, point: &str) -> Partner {
        Partner {
            id: PartnerId::original(id),
            branch: BranchId::new(1),
            window: TimeWindow::new(0, 8 * 3600),
            entry_time_s: 300,
            fixed_weekday: None,
            supervisor: SupervisorId::new(1),
            point_id: point.to_string(),
            lat: 0.0,
            lon: 0.0,
        }
    }

    fn asset(id: u64, partner_id: u64) -> Asset {
        Asset {
            id: PartnerId::original(id),
            partner: PartnerId::original(partner_id),
            service_time_s: 600,
            days_per_week: 5,
            min_frequency: 1,
            current_frequency: 2,
            split_eligible: false,
        }
    }

    #[test]
    fn routing_keys_and_visits_align_for_a_single_day() {
        let p1 = partner(1, "p1");
        let p2 = partner(2, "p2");
        let assets = vec![asset(10, 1), asset(20, 2)];
        let mut partners_by_id = HashMap::new();
        partners_by_id.insert(p1.id, p1.clone());
        partners_by_id.insert(p2.id, p2.clone());
        let mut branches = HashMap::new();
        branches.insert(BranchId::new(1), branch(1));

        let mut frequencies = HashMap::new();
        frequencies.insert(PartnerId::original(10), 1);
        frequencies.insert(PartnerId::original(20), 1);

        let mut schedule = HashMap::new();
        schedule.insert(PartnerId::original(10), WeekdaySet::from([0]));
        schedule.insert(PartnerId::original(20), WeekdaySet::from([0]));

        let keys = build_routing_keys(&assets, &partners_by_id, &schedule, &branches);
        assert_eq!(keys, vec![(BranchId::new(1), SupervisorId::new(1), 0)]);

        let visits = build_visits_by_key(&assets, &partners_by_id, &frequencies, &schedule);
        assert_eq!(visits.len(), 1);
        assert_eq!(visits.values().next().unwrap().len(), 2);
    }

    #[test]
    fn weekly_visits_merge_across_every_assigned_day() {
        let p1 = partner(1, "p1");
        let assets = vec![asset(10, 1)];
        let mut partners_by_id = HashMap::new();
        partners_by_id.insert(p1.id, p1.clone());
        let mut frequencies = HashMap::new();
        frequencies.insert(PartnerId::original(10), 3);
        let mut schedule = HashMap::new();
        schedule.insert(PartnerId::original(10), WeekdaySet::from([0, 2, 4]));

        let visits = build_weekly_visits_by_bs(&assets, &partners_by_id, &frequencies, &schedule);
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[&(BranchId::new(1), SupervisorId::new(1))].len(), 1);
    }
}
