mod cli;

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands, StageArgs};

use fieldops_algo::freq::{compute_frequencies, FrequencyConfig};
use fieldops_algo::route::{FirstSolutionStrategy, RouterConfig};
use fieldops_algo::schedule::{solve_branch_schedule, AssetDemand, BranchScheduleInput, WeekdaySet};
use fieldops_batch::{run_pipeline, BatchManifest, PipelineInput, PipelineOutput, PipelineSettings};
use fieldops_core::{
    Asset, Branch, BranchId, ConsumptionRecord, Partner, PartnerId, SkuLine, TravelMatrixRow,
};
use fieldops_io::config::{BranchConfig, Config};
use fieldops_io::export::{
    modality_name, write_agent_assets, write_agent_routes, write_branch_summary,
    write_frequencies, write_route_book, write_route_summary, write_schedule, AgentAssetRow,
    AgentRouteRow, BranchSummaryRow, FrequencyRow, RouteBookRow, RouteSummaryRow, ScheduleRow,
};
use fieldops_io::import::{
    read_assets, read_consumption, read_partners, read_sku_lines, read_travel_matrix,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);
    let threads = parse_threads(&cli.threads)?;

    match cli.command {
        Commands::Freq(args) => run_freq(&args),
        Commands::Schedule(args) => run_schedule(&args),
        Commands::Route(args) => run_route(&args, threads),
        Commands::Match(args) => run_match(&args, threads),
        Commands::Run(args) => run_full(&args, threads),
        Commands::Validate { input_dir, config } => run_validate(&input_dir, &config),
    }
}

fn init_tracing(level: tracing::Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn parse_threads(text: &str) -> Result<usize> {
    if text.eq_ignore_ascii_case("auto") {
        return Ok(0);
    }
    text.parse::<usize>()
        .with_context(|| format!("--threads expects \"auto\" or a positive integer, got '{text}'"))
}

struct RawInput {
    assets: Vec<Asset>,
    partners: Vec<Partner>,
    sku_lines: Vec<SkuLine>,
    consumption: Vec<ConsumptionRecord>,
    driving_matrix: Vec<TravelMatrixRow>,
    walking_matrix: Vec<TravelMatrixRow>,
}

fn load_raw_input(input_dir: &Path) -> Result<RawInput> {
    let partners = read_partners(
        &input_dir.join("partners.csv"),
        &input_dir.join("point_mapping.csv"),
    )?;
    let assets = read_assets(&input_dir.join("assets.csv"))?;
    let sku_lines = read_sku_lines(&input_dir.join("sku_lines.csv"))?;
    let consumption = read_consumption(&input_dir.join("consumption.csv"))?;
    let driving_matrix = read_travel_matrix(&input_dir.join("driving_matrix.csv"))?;
    let walking_matrix = read_travel_matrix(&input_dir.join("walking_matrix.csv"))?;
    Ok(RawInput {
        assets,
        partners,
        sku_lines,
        consumption,
        driving_matrix,
        walking_matrix,
    })
}

/// Branch key in the config's `[branches.N]` tables is the branch id as
/// text; every branch referenced by a partner row must have one.
fn build_branches(config: &Config) -> Result<HashMap<BranchId, Branch>> {
    let mut branches = HashMap::new();
    for (key, bc) in &config.branches {
        let id: u64 = key
            .parse()
            .with_context(|| format!("branch config section '{key}' is not a numeric branch id"))?;
        branches.insert(BranchId::new(id), branch_from_config(BranchId::new(id), config, bc));
    }
    Ok(branches)
}

fn branch_from_config(id: BranchId, config: &Config, bc: &BranchConfig) -> Branch {
    Branch {
        id,
        weekly_days: config.weekly_days,
        max_time_s: (bc.max_time_h * 3600.0).round() as i64,
        max_dist_m: bc.max_dist_km * 1000.0,
        traffic_factor: bc.traffic_factor,
        allow_saturday: config.allow_saturday,
        saturday_max_time_s: bc.saturday_max_time_h.map(|h| (h * 3600.0).round() as i64),
    }
}

fn freq_config_from(config: &Config) -> FrequencyConfig {
    FrequencyConfig {
        global_reposition_level: config.global_reposition_level,
        flexibility: config.flexibility.map(|f| f.round() as u32),
        standardize_per_partner: false,
        split_gap_s: (config.repasse_gap_h * 3600.0).round() as i64,
    }
}

fn router_config_from(config: &Config) -> RouterConfig {
    RouterConfig {
        route_cost: 1_000_000.0,
        walking_speed_mps: 5_000.0 / 3_600.0,
        modality_margin: config.modality_margin,
        strategy: FirstSolutionStrategy::PathMostConstrainedArc,
        time_limit: Duration::from_secs(config.solver_time_limit_s),
        apply_route_cost_to_walking_distance: false,
    }
}

fn scale_tiers_from(config: &Config) -> Vec<(String, i64)> {
    let mut tiers: Vec<(String, i64)> = config
        .scale_tiers
        .iter()
        .map(|t| (t.name.clone(), (t.hours * 3_600.0).round() as i64))
        .collect();
    tiers.sort_by_key(|(_, seconds)| *seconds);
    tiers
}

fn pipeline_settings_from(config: &Config, threads: usize, one_to_one: bool) -> PipelineSettings {
    PipelineSettings {
        freq: freq_config_from(config),
        router: router_config_from(config),
        scale_tiers_s: scale_tiers_from(config),
        weekly_budget_s: (config.weekly_budget_h * 3_600.0).round() as i64,
        replacement_percentile: config.replacement_percentile,
        one_to_one,
        threads,
    }
}

fn seconds_to_hours(seconds: i64) -> f64 {
    seconds as f64 / 3_600.0
}

fn meters_to_km(meters: f64) -> f64 {
    meters / 1_000.0
}

fn seconds_to_minutes(seconds: i64) -> f64 {
    seconds as f64 / 60.0
}

// --- `fieldops freq` ---

fn run_freq(args: &StageArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let raw = load_raw_input(&args.input_dir)?;
    let freq_cfg = freq_config_from(&config);

    let (outcome, diagnostics) = compute_frequencies(
        &raw.assets,
        &raw.partners,
        &raw.sku_lines,
        &raw.consumption,
        &freq_cfg,
    )?;

    std::fs::create_dir_all(&args.output_dir)?;
    let partner_branch: HashMap<PartnerId, u64> = outcome
        .partners
        .iter()
        .map(|p| (p.id, p.branch.value()))
        .collect();

    let rows: Vec<FrequencyRow> = outcome
        .assets
        .iter()
        .map(|asset| FrequencyRow {
            branch: partner_branch.get(&asset.partner).copied().unwrap_or(0),
            partner: asset.partner.to_string(),
            asset: asset.id.to_string(),
            current: asset.current_frequency,
            min: asset.min_frequency,
            reposition: outcome
                .reposition_frequencies
                .get(&asset.id)
                .copied()
                .unwrap_or(0),
            r#final: outcome.frequencies.get(&asset.id).copied().unwrap_or(0),
        })
        .collect();

    write_frequencies(&args.output_dir.join("frequencies.csv"), &rows)?;
    report_diagnostics("freq", &diagnostics);
    info!(assets = rows.len(), "wrote frequencies.csv");
    Ok(())
}

// --- `fieldops schedule` ---

fn run_schedule(args: &StageArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let raw = load_raw_input(&args.input_dir)?;
    let branches = build_branches(&config)?;
    let freq_cfg = freq_config_from(&config);

    let (freq_outcome, freq_diag) = compute_frequencies(
        &raw.assets,
        &raw.partners,
        &raw.sku_lines,
        &raw.consumption,
        &freq_cfg,
    )?;
    report_diagnostics("freq", &freq_diag);

    let partners_by_id: HashMap<PartnerId, Partner> = freq_outcome
        .partners
        .iter()
        .map(|p| (p.id, p.clone()))
        .collect();

    let branch_inputs = build_branch_schedule_inputs(
        &freq_outcome.assets,
        &partners_by_id,
        &freq_outcome.frequencies,
        &branches,
    );

    std::fs::create_dir_all(&args.output_dir)?;
    let mut rows = Vec::new();
    for input in &branch_inputs {
        let (assignment, diag) = solve_branch_schedule(input)?;
        report_diagnostics("schedule", &diag);
        for demand in &input.assets {
            let Some(days) = assignment.get(&demand.asset) else { continue };
            let partner = &partners_by_id[&demand.partner];
            rows.push(ScheduleRow {
                branch: partner.branch.value(),
                partner: demand.partner.to_string(),
                asset: demand.asset.to_string(),
                assigned_days: days.clone(),
            });
        }
    }

    write_schedule(&args.output_dir.join("schedule.csv"), config.weekly_days, &rows)?;
    info!(assets = rows.len(), "wrote schedule.csv");
    Ok(())
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
        let allow_saturday = asset.days_per_week == 6 && branch.allow_saturday;
        by_branch
            .entry(partner.branch)
            .or_default()
            .push(AssetDemand {
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

// --- `fieldops route` and `fieldops match` share the full pipeline, only
// differing in which output tables get written. ---

fn build_pipeline_input(raw: RawInput, branches: HashMap<BranchId, Branch>) -> PipelineInput {
    PipelineInput {
        assets: raw.assets,
        partners: raw.partners,
        sku_lines: raw.sku_lines,
        consumption: raw.consumption,
        branches,
        driving_matrix: raw.driving_matrix,
        walking_matrix: raw.walking_matrix,
    }
}

fn run_route(args: &StageArgs, threads: usize) -> Result<()> {
    let config = Config::load(&args.config)?;
    let raw = load_raw_input(&args.input_dir)?;
    let branches = build_branches(&config)?;
    let settings = pipeline_settings_from(&config, threads, args.one_to_one);

    let output = run_pipeline(build_pipeline_input(raw, branches), &settings)?;
    report_diagnostics("route", &output.diagnostics);

    std::fs::create_dir_all(&args.output_dir)?;
    write_route_tables(&args.output_dir, &output)?;
    info!(routes = output.routes.len(), "wrote route book and route summary");
    Ok(())
}

fn run_match(args: &StageArgs, threads: usize) -> Result<()> {
    let config = Config::load(&args.config)?;
    let raw = load_raw_input(&args.input_dir)?;
    let branches = build_branches(&config)?;
    let settings = pipeline_settings_from(&config, threads, args.one_to_one);

    let output = run_pipeline(build_pipeline_input(raw, branches), &settings)?;
    report_diagnostics("match", &output.diagnostics);

    std::fs::create_dir_all(&args.output_dir)?;
    write_agent_tables(&args.output_dir, &output, &settings)?;
    info!(agents = output.bundles.values().map(Vec::len).sum::<usize>(), "wrote agent allocation tables");
    Ok(())
}

fn run_full(args: &StageArgs, threads: usize) -> Result<()> {
    let config = Config::load(&args.config)?;
    let raw = load_raw_input(&args.input_dir)?;
    let branches = build_branches(&config)?;
    let settings = pipeline_settings_from(&config, threads, args.one_to_one);

    let output = run_pipeline(build_pipeline_input(raw, branches), &settings)?;
    report_diagnostics("run", &output.diagnostics);

    std::fs::create_dir_all(&args.output_dir)?;

    let partner_branch: HashMap<PartnerId, u64> = output
        .partners
        .iter()
        .map(|p| (p.id, p.branch.value()))
        .collect();
    let frequency_rows: Vec<FrequencyRow> = output
        .assets
        .iter()
        .map(|asset| FrequencyRow {
            branch: partner_branch.get(&asset.partner).copied().unwrap_or(0),
            partner: asset.partner.to_string(),
            asset: asset.id.to_string(),
            current: asset.current_frequency,
            min: asset.min_frequency,
            reposition: output
                .reposition_frequencies
                .get(&asset.id)
                .copied()
                .unwrap_or(0),
            r#final: output.frequencies.get(&asset.id).copied().unwrap_or(0),
        })
        .collect();
    write_frequencies(&args.output_dir.join("frequencies.csv"), &frequency_rows)?;

    let schedule_rows: Vec<ScheduleRow> = output
        .assets
        .iter()
        .filter_map(|asset| {
            let days = output.schedule.get(&asset.id)?;
            Some(ScheduleRow {
                branch: partner_branch.get(&asset.partner).copied().unwrap_or(0),
                partner: asset.partner.to_string(),
                asset: asset.id.to_string(),
                assigned_days: days.clone(),
            })
        })
        .collect();
    write_schedule(&args.output_dir.join("schedule.csv"), config.weekly_days, &schedule_rows)?;

    write_route_tables(&args.output_dir, &output)?;
    write_agent_tables(&args.output_dir, &output, &settings)?;
    write_branch_summary_table(&args.output_dir, &output, &settings)?;

    let manifest = BatchManifest::from_jobs(chrono::Utc::now(), output.jobs.clone());
    fieldops_batch::write_batch_manifest(&args.output_dir.join("batch_manifest.json"), &manifest)?;

    if !output.infeasible_groups.is_empty() {
        tracing::warn!(
            count = output.infeasible_groups.len(),
            "groups dropped as individually infeasible (see diagnostics)"
        );
    }

    info!(
        jobs = manifest.num_jobs,
        failures = manifest.failure,
        "pipeline run complete"
    );
    if manifest.failure > 0 {
        bail!("{} subproblem(s) failed during this run; see {}/batch_manifest.json", manifest.failure, args.output_dir.display());
    }
    Ok(())
}

fn write_route_tables(output_dir: &Path, output: &PipelineOutput) -> Result<()> {
    let service_s: HashMap<PartnerId, i64> =
        output.assets.iter().map(|a| (a.id, a.service_time_s)).collect();

    let mut book_rows = Vec::new();
    let mut summary_rows = Vec::new();

    for route in &output.routes {
        let partner_set: BTreeSet<PartnerId> = route.partners.iter().copied().collect();
        summary_rows.push(RouteSummaryRow {
            branch: route.branch.value(),
            day: route.day,
            route: route.route_id.clone(),
            hours: seconds_to_hours(route.result.total_time_s),
            fte: route.fte,
            asset_count: route.assets.len() as u32,
            partner_count: partner_set.len() as u32,
            total_distance_km: meters_to_km(route.result.total_distance_m),
            total_time_min: seconds_to_minutes(route.result.total_time_s),
            modality: modality_name(route.result.modality).to_string(),
            scale: route.hour_tier.clone(),
        });

        let visits = route.partners.len().max(1) as f64;
        for (ordinal, (partner, asset)) in route.partners.iter().zip(route.assets.iter()).enumerate() {
            book_rows.push(RouteBookRow {
                branch: route.branch.value(),
                day: route.day,
                route: route.route_id.clone(),
                visit_ordinal: ordinal as u32 + 1,
                partner: partner.to_string(),
                asset: asset.to_string(),
                distance_km: meters_to_km(route.result.total_distance_m) / visits,
                travel_min: seconds_to_minutes(route.result.total_time_s) / visits,
                service_min: seconds_to_minutes(service_s.get(asset).copied().unwrap_or(0)),
                modality: modality_name(route.result.modality).to_string(),
                scale: route.hour_tier.clone(),
            });
        }
    }

    write_route_book(&output_dir.join("route_book.csv"), &book_rows)?;
    write_route_summary(&output_dir.join("route_summary.csv"), &summary_rows)?;
    Ok(())
}

fn write_agent_tables(
    output_dir: &Path,
    output: &PipelineOutput,
    _settings: &PipelineSettings,
) -> Result<()> {
    let routes_by_id: HashMap<&str, &fieldops_batch::RouteRecord> =
        output.routes.iter().map(|r| (r.route_id.as_str(), r)).collect();

    let mut route_rows = Vec::new();
    let mut asset_rows: HashMap<(String, PartnerId, PartnerId), BTreeSet<u8>> = HashMap::new();

    for (&(branch, supervisor), agents) in &output.bundles {
        for (agent_idx, bundle) in agents.iter().enumerate() {
            let agent_id = format!("A-b{}-s{}-{agent_idx}", branch.value(), supervisor.value());
            for route_id in &bundle.routes {
                let Some(route) = routes_by_id.get(route_id.as_str()) else { continue };
                // §4.4 Step 4: a bundle promoted to full-time reports every
                // member route at the bundle's promoted hours/tier, not the
                // route's own solved duration.
                let (scale, hours) = if bundle.is_full_time {
                    ("full-time".to_string(), seconds_to_hours(bundle.hours_s))
                } else {
                    (route.hour_tier.clone(), seconds_to_hours(route.result.total_time_s))
                };
                route_rows.push(AgentRouteRow {
                    agent: agent_id.clone(),
                    weekday: route.day,
                    route: route_id.clone(),
                    modality: modality_name(route.result.modality).to_string(),
                    scale,
                    hours,
                });
                for (partner, asset) in route.partners.iter().zip(route.assets.iter()) {
                    asset_rows
                        .entry((agent_id.clone(), *partner, *asset))
                        .or_default()
                        .insert(route.day);
                }
            }
        }
    }

    write_agent_routes(&output_dir.join("agent_routes.csv"), &route_rows)?;

    let weekly_days = 6u8; // widest possible weekday span; unused columns are all-false.
    let rows: Vec<AgentAssetRow> = asset_rows
        .into_iter()
        .map(|((agent, partner, asset), days)| AgentAssetRow {
            agent,
            partner: partner.to_string(),
            asset: asset.to_string(),
            assigned_days: days,
        })
        .collect();
    write_agent_assets(&output_dir.join("agent_assets.csv"), weekly_days, &rows)?;
    Ok(())
}

fn write_branch_summary_table(
    output_dir: &Path,
    output: &PipelineOutput,
    _settings: &PipelineSettings,
) -> Result<()> {
    let mut by_branch: HashMap<BranchId, Vec<&fieldops_batch::RouteRecord>> = HashMap::new();
    for route in &output.routes {
        by_branch.entry(route.branch).or_default().push(route);
    }

    let partner_branch: HashMap<PartnerId, BranchId> = output
        .partners
        .iter()
        .map(|p| (p.id, p.branch))
        .collect();
    let mut assets_by_branch: HashMap<BranchId, Vec<&Asset>> = HashMap::new();
    let mut partners_by_branch: HashMap<BranchId, BTreeSet<PartnerId>> = HashMap::new();
    for asset in &output.assets {
        if let Some(&branch) = partner_branch.get(&asset.partner) {
            assets_by_branch.entry(branch).or_default().push(asset);
            partners_by_branch.entry(branch).or_default().insert(asset.partner);
        }
    }

    let mut rows = Vec::new();
    for (branch, routes) in &by_branch {
        let active_days: BTreeSet<u8> = routes.iter().map(|r| r.day).collect();
        let day_count = active_days.len().max(1) as f64;
        let route_count = routes.len() as f64;
        let fte_sum: f64 = routes.iter().map(|r| r.fte).sum();
        let distance_sum: f64 = routes.iter().map(|r| r.result.total_distance_m).sum();
        let travel_sum: f64 = routes.iter().map(|r| r.result.total_time_s as f64).sum();

        let assets = assets_by_branch.get(branch).cloned().unwrap_or_default();
        let service_sum: f64 = assets.iter().map(|a| a.service_time_s as f64).sum();

        let partner_count = partners_by_branch.get(branch).map(BTreeSet::len).unwrap_or(0).max(1) as f64;
        let avg_frequency = assets.len() as f64 / partner_count;

        rows.push(BranchSummaryRow {
            branch: branch.value(),
            avg_routes: route_count / day_count,
            avg_fte: fte_sum / day_count,
            avg_distance_km: meters_to_km(distance_sum) / day_count,
            avg_service_min: seconds_to_minutes(service_sum.round() as i64) / day_count,
            avg_travel_min: seconds_to_minutes(travel_sum.round() as i64) / day_count,
            avg_frequency,
        });
    }
    rows.sort_by_key(|r| r.branch);

    write_branch_summary(&output_dir.join("branch_summary.csv"), &rows)?;
    Ok(())
}

// --- `fieldops validate` ---

fn run_validate(input_dir: &Path, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let raw = load_raw_input(input_dir)?;
    let branches = build_branches(&config)?;

    let mut diagnostics = fieldops_core::Diagnostics::new();

    let partner_ids: std::collections::HashSet<PartnerId> =
        raw.partners.iter().map(|p| p.id).collect();
    let asset_ids: std::collections::HashSet<PartnerId> = raw.assets.iter().map(|a| a.id).collect();

    for partner in &raw.partners {
        if !branches.contains_key(&partner.branch) {
            diagnostics.add_warning_with_entity(
                "referential",
                "partner references a branch absent from config",
                partner.id.to_string(),
            );
        }
    }
    for asset in &raw.assets {
        if !partner_ids.contains(&asset.partner) {
            diagnostics.add_error(
                "referential",
                format!("asset {} references unknown partner {}", asset.id, asset.partner),
            );
        }
    }
    for sku in &raw.sku_lines {
        if !asset_ids.contains(&sku.asset) {
            diagnostics.add_error(
                "referential",
                format!("sku line for sku '{}' references unknown asset {}", sku.sku, sku.asset),
            );
        }
    }
    for record in &raw.consumption {
        if !asset_ids.contains(&record.asset) {
            diagnostics.add_warning_with_entity(
                "referential",
                "consumption row references unknown asset",
                record.asset.to_string(),
            );
        }
    }

    report_diagnostics("validate", &diagnostics);
    info!(
        partners = raw.partners.len(),
        assets = raw.assets.len(),
        sku_lines = raw.sku_lines.len(),
        consumption_rows = raw.consumption.len(),
        status = diagnostics.status(),
        "ingest validated"
    );

    if diagnostics.has_errors() {
        bail!("validation found {} error(s); see log above", diagnostics.error_count());
    }
    Ok(())
}

fn report_diagnostics(stage: &str, diagnostics: &fieldops_core::Diagnostics) {
    for issue in diagnostics.issues() {
        match issue.severity {
            fieldops_core::Severity::Warning => tracing::warn!(stage, "{issue}"),
            fieldops_core::Severity::Error => tracing::error!(stage, "{issue}"),
        }
    }
}
