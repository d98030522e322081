//! Nearest polling wards around a point.

use std::collections::HashSet;

use chrono::NaiveDate;
use log::debug;
use snafu::prelude::*;

use crate::config::*;
use crate::store::WardStore;

/// Mean earth radius, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in meters (haversine formula).
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Finds the wards closest to `point`.
///
/// All the wards within `radius` meters are returned if there are at least `min_count`
/// of them. Otherwise the search widens to the distance of the `min_count`-th closest
/// ward. Wards at exactly the boundary distance are always all included, so that the
/// result may contain more than `min_count` wards.
///
/// The result is sorted by distance, then by ward. Wards without a location are ignored.
pub fn find_nearest(
    wards: &[Ward],
    point: &GeoPoint,
    radius: f64,
    min_count: usize,
) -> CountingResult<Vec<Ward>> {
    ensure!(
        radius.is_finite() && radius >= 0.0,
        InvalidArgumentSnafu {
            reason: format!("radius must be a non-negative distance, got {}", radius)
        }
    );
    ensure!(
        min_count >= 1,
        InvalidArgumentSnafu {
            reason: "at least one ward must be requested"
        }
    );
    ensure!(
        point.is_valid(),
        InvalidArgumentSnafu {
            reason: format!("invalid point {:?}", point)
        }
    );

    let mut ranked: Vec<(f64, WardId, &Ward)> = wards
        .iter()
        .filter_map(|w| {
            w.location
                .map(|loc| (haversine_distance(point, &loc), w.id(), w))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    // A ward listed twice only counts once, at its closest position.
    let mut seen: HashSet<WardId> = HashSet::new();
    ranked.retain(|(_, id, _)| seen.insert(id.clone()));

    let within = ranked.iter().take_while(|(d, _, _)| *d <= radius).count();
    let cutoff = if within >= min_count {
        radius
    } else {
        match ranked.get(min_count - 1) {
            Some((d, _, _)) => *d,
            // Not enough wards in the whole index: take all of them.
            None => f64::INFINITY,
        }
    };
    debug!(
        "find_nearest: {} located wards, {} within {} m, cutoff {} m",
        ranked.len(),
        within,
        radius,
        cutoff
    );

    Ok(ranked
        .into_iter()
        .take_while(|(d, _, _)| *d <= cutoff)
        .map(|(_, _, w)| w.clone())
        .collect())
}

/// Looks up the nearest wards among the wards open on `voting_date`.
pub fn find_nearest_wards<S: WardStore + ?Sized>(
    store: &S,
    voting_date: NaiveDate,
    point: &GeoPoint,
    radius: f64,
    min_count: usize,
) -> CountingResult<Vec<Ward>> {
    let wards = store.wards(voting_date);
    debug!(
        "find_nearest_wards: {} wards on {}",
        wards.len(),
        voting_date
    );
    find_nearest(&wards, point, radius, min_count)
}
