//! Provider matching & ranking
//!
//! Pure functions over a provider snapshot. Distance is assigned in priority
//! order: coordinates, same city, proximity graph, metro list. Providers
//! with none of those land in the `other` bucket and always rank after
//! every distance-bearing candidate.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

use crate::geo::{haversine_km, round2, GeoProximityIndex, METRO_AREA_DISTANCE_KM};
use crate::models::{Coordinates, Provider};

/// A provider that passed the filter, with its distance when one could be
/// derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub provider: Provider,
    pub distance_km: Option<f64>,
}

/// Output of ranked mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedCandidates {
    /// Distance-bearing, by (distance asc, rating desc)
    pub nearby: Vec<Candidate>,
    /// No derivable distance, by rating desc
    pub other: Vec<Candidate>,
}

impl RankedCandidates {
    pub fn is_empty(&self) -> bool {
        self.nearby.is_empty() && self.other.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nearby.len() + self.other.len()
    }

    /// Single list: every distance-bearing candidate, then the rest.
    pub fn merged(&self) -> Vec<&Candidate> {
        self.nearby.iter().chain(self.other.iter()).collect()
    }
}

/// Output of split mode (guided flow, city first).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitySplit {
    pub same_city: Vec<Provider>,
    pub other_cities: Vec<Provider>,
}

/// Active providers whose expertise contains `category`.
pub fn qualified<'a>(category: &str, pool: &'a [Provider]) -> Vec<&'a Provider> {
    pool.iter()
        .filter(|p| p.is_active() && p.offers(category))
        .collect()
}

/// Distance from the requester to a provider, `None` when unknown.
pub fn assign_distance(
    provider: &Provider,
    requester_city: Option<&str>,
    requester_coords: Option<Coordinates>,
    geo: &GeoProximityIndex,
) -> Option<f64> {
    if let (Some(from), Some(to)) = (requester_coords, provider.coordinates) {
        return Some(round2(haversine_km(from, to)));
    }

    let requester_city = requester_city.map(str::trim).filter(|c| !c.is_empty())?;
    let provider_city = provider
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())?;

    if requester_city.eq_ignore_ascii_case(provider_city) {
        return Some(0.0);
    }

    let graph_distance = geo.distance_between(requester_city, provider_city);
    if graph_distance <= geo.radius_km() {
        return Some(graph_distance);
    }

    if geo.general_area_proximity(requester_city, provider_city) {
        return Some(METRO_AREA_DISTANCE_KM);
    }

    None
}

/// Ranked mode, used by single-shot booking.
pub fn rank(
    category: &str,
    requester_city: Option<&str>,
    requester_coords: Option<Coordinates>,
    pool: &[Provider],
    geo: &GeoProximityIndex,
) -> RankedCandidates {
    let mut ranked = RankedCandidates::default();

    for provider in qualified(category, pool) {
        let distance_km = assign_distance(provider, requester_city, requester_coords, geo);
        let candidate = Candidate {
            provider: provider.clone(),
            distance_km,
        };
        match distance_km {
            Some(_) => ranked.nearby.push(candidate),
            None => ranked.other.push(candidate),
        }
    }

    ranked.nearby.sort_by(|a, b| {
        let da = a.distance_km.unwrap_or(f64::INFINITY);
        let db = b.distance_km.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
            .then_with(|| by_rating_desc(&a.provider, &b.provider))
    });
    ranked
        .other
        .sort_by(|a, b| by_rating_desc(&a.provider, &b.provider));

    debug!(
        category,
        nearby = ranked.nearby.len(),
        other = ranked.other.len(),
        "Ranked candidates"
    );

    ranked
}

/// Split mode: exact (case-insensitive) city match vs everyone else.
pub fn split_by_city(category: &str, requester_city: Option<&str>, pool: &[Provider]) -> CitySplit {
    let city = requester_city.map(str::trim).unwrap_or_default();
    let mut split = CitySplit::default();

    for provider in qualified(category, pool) {
        let same = !city.is_empty()
            && provider
                .city
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(city));
        if same {
            split.same_city.push(provider.clone());
        } else {
            split.other_cities.push(provider.clone());
        }
    }

    split.same_city.sort_by(by_rating_desc);
    split.other_cities.sort_by(by_rating_desc);

    debug!(
        category,
        same_city = split.same_city.len(),
        other_cities = split.other_cities.len(),
        "Split candidates by city"
    );

    split
}

fn by_rating_desc(a: &Provider, b: &Provider) -> Ordering {
    b.rating.total_cmp(&a.rating)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::TownRow;
    use crate::models::ProviderStatus;

    fn provider(id: &str, expertise: &[&str], city: Option<&str>, rating: f64) -> Provider {
        Provider {
            id: id.to_string(),
            name: format!("Provider {}", id),
            expertise: expertise.iter().map(|s| s.to_string()).collect(),
            status: ProviderStatus::Active,
            rating,
            city: city.map(str::to_string),
            coordinates: None,
            profile_image: None,
        }
    }

    fn klang_valley() -> GeoProximityIndex {
        GeoProximityIndex::from_rows(
            vec![
                TownRow { town: "Petaling Jaya".into(), latitude: 3.1073, longitude: 101.6067 },
                TownRow { town: "Subang Jaya".into(), latitude: 3.0567, longitude: 101.5851 },
                TownRow { town: "Klang".into(), latitude: 3.0449, longitude: 101.4456 },
            ],
            50.0,
        )
    }

    #[test]
    fn test_filter_is_substring_and_active_only() {
        let mut inactive = provider("p3", &["Plumber"], Some("Klang"), 5.0);
        inactive.status = ProviderStatus::Inactive;
        let pool = vec![
            provider("p1", &["Plumber - Pipe Repair"], Some("Klang"), 4.0),
            provider("p2", &["Electrician"], Some("Klang"), 4.0),
            inactive,
            provider("p4", &["HVAC Repair"], Some("Klang"), 4.0),
        ];

        let ids: Vec<&str> = qualified("plumber", &pool).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1"]);

        // lenient match keeps its false positives
        let ids: Vec<&str> = qualified("AC", &pool).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p4"]);
    }

    #[test]
    fn test_distance_priority() {
        let geo = klang_valley();
        let mut with_coords = provider("c", &["Plumber"], Some("Nowhere"), 4.0);
        with_coords.coordinates = Some(Coordinates::new(3.1073, 101.6067));
        let requester = Some(Coordinates::new(3.1073, 101.6067));

        assert_eq!(assign_distance(&with_coords, Some("Klang"), requester, &geo), Some(0.0));

        let same = provider("s", &["Plumber"], Some("KLANG"), 4.0);
        assert_eq!(assign_distance(&same, Some("klang"), None, &geo), Some(0.0));

        let graph = provider("g", &["Plumber"], Some("Subang Jaya"), 4.0);
        let d = assign_distance(&graph, Some("Petaling Jaya"), None, &geo).unwrap();
        assert!(d > 0.0 && d < 10.0);

        let metro = provider("m", &["Plumber"], Some("Cheras"), 4.0);
        assert_eq!(
            assign_distance(&metro, Some("Ampang"), None, &geo),
            Some(METRO_AREA_DISTANCE_KM)
        );

        let far = provider("f", &["Plumber"], Some("Ipoh"), 4.0);
        assert_eq!(assign_distance(&far, Some("Klang"), None, &geo), None);
    }

    #[test]
    fn test_rank_distance_before_rating() {
        let geo = klang_valley();
        let pool = vec![
            provider("close-low", &["Plumber"], Some("Petaling Jaya"), 3.0),
            provider("far-high", &["Plumber"], Some("Klang"), 5.0),
            provider("unknown-top", &["Plumber"], Some("Ipoh"), 5.0),
            provider("unknown-low", &["Plumber"], Some("Johor Bahru"), 2.0),
        ];

        let ranked = rank("Plumber", Some("Petaling Jaya"), None, &pool, &geo);
        let order: Vec<&str> = ranked.merged().iter().map(|c| c.provider.id.as_str()).collect();
        assert_eq!(order, vec!["close-low", "far-high", "unknown-top", "unknown-low"]);
        assert!(ranked.other.iter().all(|c| c.distance_km.is_none()));
    }

    #[test]
    fn test_rank_is_monotonic_in_distance() {
        let geo = GeoProximityIndex::default();
        let requester = Coordinates::new(3.0, 101.0);
        let pool: Vec<Provider> = (0..6)
            .map(|i| {
                let mut p = provider(&format!("p{}", i), &["Painter"], None, i as f64);
                p.coordinates = Some(Coordinates::new(3.0 + 0.05 * (6 - i) as f64, 101.0));
                p
            })
            .collect();

        let ranked = rank("painter", None, Some(requester), &pool, &geo);
        let distances: Vec<f64> = ranked.nearby.iter().filter_map(|c| c.distance_km).collect();
        assert_eq!(distances.len(), 6);
        assert!(distances.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_equal_distance_breaks_on_rating() {
        let geo = GeoProximityIndex::default();
        let pool = vec![
            provider("a", &["Cleaner"], Some("Klang"), 3.9),
            provider("b", &["Cleaner"], Some("Klang"), 4.8),
        ];
        let ranked = rank("Cleaner", Some("Klang"), None, &pool, &geo);
        assert_eq!(ranked.nearby[0].provider.id, "b");
    }

    #[test]
    fn test_split_keeps_same_city_apart() {
        let pool = vec![
            provider("home", &["Plumber"], Some("Shah Alam"), 4.5),
            provider("away", &["Plumber"], Some("Seremban"), 4.9),
        ];

        let split = split_by_city("Plumber", Some("shah alam"), &pool);
        assert_eq!(split.same_city.len(), 1);
        assert_eq!(split.same_city[0].id, "home");
        assert_eq!(split.other_cities.len(), 1);
        assert_eq!(split.other_cities[0].id, "away");
    }

    #[test]
    fn test_split_without_requester_city() {
        let pool = vec![
            provider("a", &["Roofer"], Some("Klang"), 4.0),
            provider("b", &["Roofer"], None, 4.6),
        ];
        let split = split_by_city("Roofer", None, &pool);
        assert!(split.same_city.is_empty());
        assert_eq!(split.other_cities[0].id, "b");
    }
}
