//! S4 Agent Matcher (§4.4): pair independent daily routes into per-agent
//! weekly bundles using a similarity-driven greedy heuristic.

use std::collections::HashSet;

use fieldops_core::{Modality, PartnerId, Seconds};

#[derive(Debug, Clone)]
pub struct RouteSummary {
    pub route_id: String,
    pub day: u8,
    pub modality: Modality,
    pub hour_tier: String,
    pub is_full_time: bool,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub assets: HashSet<PartnerId>,
    /// Solved route duration, carried through for the weekly-capacity retry
    /// check (§4.3 failure semantics, §7) — not used by the bundling score.
    pub total_time_s: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AgentBundle {
    pub routes: Vec<String>,
    pub is_full_time: bool,
    /// Weekly hours assigned to this bundle; `weekly_tmax_s` once promoted.
    pub hours_s: Seconds,
    pub fte: f64,
}

pub struct MatcherConfig {
    pub dmax_m: f64,
    /// `true` runs 1-to-1 mode: every route is already its own agent.
    pub one_to_one: bool,
    /// Weekly hour cap a full-time agent is promoted to (§4.4 Step 4).
    pub weekly_tmax_s: Seconds,
}

fn haversine_km(a_lat: f64, a_lon: f64, b_lat: f64, b_lon: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lat2) = (a_lat.to_radians(), b_lat.to_radians());
    let dlat = (b_lat - a_lat).to_radians();
    let dlon = (b_lon - a_lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

fn shared_asset_fraction(a: &RouteSummary, b: &RouteSummary) -> f64 {
    let shared = a.assets.intersection(&b.assets).count() as f64;
    let smaller = a.assets.len().min(b.assets.len()).max(1) as f64;
    shared / smaller
}

/// Lower is better; this is the lexicographic scoring key from §4.4 Step 2,
/// packed into an ordered tuple so the usual `<` comparison implements it.
fn score_pair(anchor: &RouteSummary, candidate: &RouteSummary) -> (u8, u8, u8, u8, i64, i64) {
    let modality_mismatch = (anchor.modality as u8 != candidate.modality as u8) as u8;
    let tier_mismatch = (anchor.hour_tier != candidate.hour_tier) as u8;
    let anchor_not_full_time = !anchor.is_full_time as u8;
    let anchor_not_driving = (anchor.modality != Modality::Driving) as u8;
    let shared_fraction = shared_asset_fraction(anchor, candidate);
    // Negated and scaled so a higher shared fraction sorts lower (better).
    let shared_key = -(shared_fraction * 1_000_000.0) as i64;
    let distance_km = haversine_km(
        anchor.centroid_lat,
        anchor.centroid_lon,
        candidate.centroid_lat,
        candidate.centroid_lon,
    );
    let distance_key = (distance_km * 1000.0) as i64;
    (
        modality_mismatch,
        tier_mismatch,
        anchor_not_full_time,
        anchor_not_driving,
        shared_key,
        distance_key,
    )
}

/// Step 4: a bundle with any full-time route is promoted wholesale to
/// `hours = weekly_tmax_s`, `fte = 1.0`; otherwise hours/FTE reflect the
/// sum of its member routes' own solved durations.
fn bundle_of(
    routes: Vec<String>,
    any_full_time: bool,
    summed_hours_s: Seconds,
    config: &MatcherConfig,
) -> AgentBundle {
    let (hours_s, fte) = if any_full_time {
        (config.weekly_tmax_s, 1.0)
    } else {
        (
            summed_hours_s,
            summed_hours_s as f64 / config.weekly_tmax_s as f64,
        )
    };
    AgentBundle {
        routes,
        is_full_time: any_full_time,
        hours_s,
        fte,
    }
}

fn compatible(anchor: &RouteSummary, candidate: &RouteSummary, dmax_km: f64) -> bool {
    anchor.day != candidate.day
        && haversine_km(
            anchor.centroid_lat,
            anchor.centroid_lon,
            candidate.centroid_lat,
            candidate.centroid_lon,
        ) <= dmax_km
}

/// §4.4: one bundling pass for routes already filtered to a single
/// `(branch, supervisor)`.
pub fn match_routes(routes: &[RouteSummary], config: &MatcherConfig) -> Vec<AgentBundle> {
    if config.one_to_one {
        return routes
            .iter()
            .map(|r| bundle_of(vec![r.route_id.clone()], r.is_full_time, r.total_time_s, config))
            .collect();
    }

    let dmax_km = config.dmax_m / 1000.0;
    let mut order: Vec<usize> = (0..routes.len()).collect();
    order.sort_by_key(|&i| (routes[i].day, routes[i].route_id.clone()));

    let mut assigned = vec![false; routes.len()];
    let mut bundles = Vec::new();

    for &anchor_idx in &order {
        if assigned[anchor_idx] {
            continue;
        }
        assigned[anchor_idx] = true;
        let anchor = &routes[anchor_idx];
        let mut bundle_routes = vec![anchor.route_id.clone()];
        let mut used_days: HashSet<u8> = HashSet::from([anchor.day]);
        let mut any_full_time = anchor.is_full_time;
        let mut hours_s = anchor.total_time_s;

        loop {
            let best = routes
                .iter()
                .enumerate()
                .filter(|(idx, r)| {
                    !assigned[*idx] && !used_days.contains(&r.day) && compatible(anchor, r, dmax_km)
                })
                .min_by_key(|(_, r)| score_pair(anchor, r));

            match best {
                Some((idx, candidate)) => {
                    assigned[idx] = true;
                    used_days.insert(candidate.day);
                    any_full_time |= candidate.is_full_time;
                    hours_s += candidate.total_time_s;
                    bundle_routes.push(candidate.route_id.clone());
                }
                None => break,
            }
        }

        bundles.push(bundle_of(bundle_routes, any_full_time, hours_s, config));
    }

    bundles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, day: u8, lat: f64, lon: f64, assets: &[u64]) -> RouteSummary {
        RouteSummary {
            route_id: id.to_string(),
            day,
            modality: Modality::Driving,
            hour_tier: "full".to_string(),
            is_full_time: false,
            centroid_lat: lat,
            centroid_lon: lon,
            assets: assets.iter().map(|&a| PartnerId::original(a)).collect(),
            total_time_s: 3600,
        }
    }

    #[test]
    fn invariant_6_bundle_never_repeats_a_weekday() {
        let routes = vec![
            route("r1", 0, -23.5, -46.6, &[1, 2]),
            route("r2", 1, -23.5, -46.6, &[2, 3]),
            route("r3", 2, -23.5, -46.6, &[3, 4]),
        ];
        let config = MatcherConfig {
            dmax_m: 50_000.0,
            one_to_one: false,
            weekly_tmax_s: 8 * 3600,
        };
        let bundles = match_routes(&routes, &config);
        for bundle in &bundles {
            let days: Vec<u8> = bundle
                .routes
                .iter()
                .map(|id| routes.iter().find(|r| &r.route_id == id).unwrap().day)
                .collect();
            let unique: HashSet<u8> = days.iter().copied().collect();
            assert_eq!(days.len(), unique.len());
        }
    }

    #[test]
    fn far_apart_routes_stay_in_separate_bundles() {
        let routes = vec![
            route("near", 0, -23.5, -46.6, &[1]),
            route("far", 1, 10.0, 10.0, &[2]),
        ];
        let config = MatcherConfig {
            dmax_m: 1_000.0,
            one_to_one: false,
            weekly_tmax_s: 8 * 3600,
        };
        let bundles = match_routes(&routes, &config);
        assert_eq!(bundles.len(), 2);
    }

    #[test]
    fn one_to_one_mode_bypasses_the_heuristic() {
        let routes = vec![route("r1", 0, 0.0, 0.0, &[1]), route("r2", 1, 0.0, 0.0, &[2])];
        let config = MatcherConfig {
            dmax_m: 1.0,
            one_to_one: true,
            weekly_tmax_s: 8 * 3600,
        };
        let bundles = match_routes(&routes, &config);
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].routes, vec!["r1".to_string()]);
    }

    #[test]
    fn full_time_route_promotes_the_whole_bundle() {
        let mut anchor = route("r1", 0, -23.5, -46.6, &[1, 2]);
        anchor.is_full_time = true;
        anchor.total_time_s = 5 * 3600;
        let partner = route("r2", 1, -23.5, -46.6, &[2, 3]);
        let routes = vec![anchor, partner];
        let config = MatcherConfig {
            dmax_m: 50_000.0,
            one_to_one: false,
            weekly_tmax_s: 8 * 3600,
        };
        let bundles = match_routes(&routes, &config);
        assert_eq!(bundles.len(), 1);
        assert!(bundles[0].is_full_time);
        assert_eq!(bundles[0].hours_s, 8 * 3600);
        assert_eq!(bundles[0].fte, 1.0);
    }

    #[test]
    fn part_time_bundle_keeps_summed_hours() {
        let routes = vec![
            route("r1", 0, -23.5, -46.6, &[1, 2]),
            route("r2", 1, -23.5, -46.6, &[2, 3]),
        ];
        let config = MatcherConfig {
            dmax_m: 50_000.0,
            one_to_one: false,
            weekly_tmax_s: 8 * 3600,
        };
        let bundles = match_routes(&routes, &config);
        assert_eq!(bundles.len(), 1);
        assert!(!bundles[0].is_full_time);
        assert_eq!(bundles[0].hours_s, 2 * 3600);
    }
}
