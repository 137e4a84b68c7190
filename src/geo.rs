//! City proximity index
//!
//! Precomputed "nearby towns" graph built once from a static
//! `Town,Lat,Lon` table. Read-only after construction.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::BookingError;
use crate::models::Coordinates;
use crate::Result;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

/// Flat distance assumed for two towns of the same metro area when the
/// graph has no entry for the pair.
pub const METRO_AREA_DISTANCE_KM: f64 = 30.0;

const KL_SELANGOR_CITIES: &[&str] = &[
    "kuala lumpur", "petaling jaya", "shah alam", "subang jaya", "klang",
    "ampang", "cheras", "puchong", "kajang", "seri kembangan", "cyberjaya",
    "putrajaya", "bangi", "rawang", "sentul", "mont kiara", "bangsar",
    "damansara", "gombak", "kepong", "setapak",
];

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * h.sqrt().asin() * EARTH_RADIUS_KM
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One row of the geographic dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TownRow {
    pub town: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct GeoProximityIndex {
    graph: BTreeMap<String, BTreeMap<String, f64>>,
    radius_km: f64,
}

impl Default for GeoProximityIndex {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_KM)
    }
}

impl GeoProximityIndex {
    pub fn new(radius_km: f64) -> Self {
        Self {
            graph: BTreeMap::new(),
            radius_km,
        }
    }

    /// Build the graph over every ordered pair of distinct towns, keeping
    /// pairs within `radius_km`.
    pub fn from_rows(rows: impl IntoIterator<Item = TownRow>, radius_km: f64) -> Self {
        let towns: Vec<(String, Coordinates)> = rows
            .into_iter()
            .filter(|row| row.latitude.is_finite() && row.longitude.is_finite())
            .map(|row| {
                (
                    row.town.trim().to_lowercase(),
                    Coordinates::new(row.latitude, row.longitude),
                )
            })
            .filter(|(town, _)| !town.is_empty())
            .collect();

        let mut graph: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();

        for (i, (town, origin)) in towns.iter().enumerate() {
            let neighbours = graph.entry(town.clone()).or_default();

            for (j, (other, destination)) in towns.iter().enumerate() {
                if i == j || other == town {
                    continue;
                }

                let distance = haversine_km(*origin, *destination);
                if distance <= radius_km {
                    neighbours.insert(other.clone(), round2(distance));
                }
            }
        }

        info!(
            towns = graph.len(),
            radius_km = radius_km,
            "City proximity graph built"
        );

        Self { graph, radius_km }
    }

    /// Parse a `Town,Lat,Lon` table. Column positions come from the header;
    /// rows with missing or unparsable coordinates are skipped.
    pub fn from_csv_str(text: &str, radius_km: f64) -> Result<Self> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| BookingError::DatasetError("dataset is empty".to_string()))?;
        let columns: Vec<String> = split_csv_line(header)
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();

        let find = |name: &str| {
            columns.iter().position(|c| c == name).ok_or_else(|| {
                BookingError::DatasetError(format!("dataset header has no '{}' column", name))
            })
        };
        let town_idx = find("town")?;
        let lat_idx = find("lat")?;
        let lon_idx = find("lon")?;

        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for line in lines {
            let fields = split_csv_line(line);
            let town = fields.get(town_idx).cloned().unwrap_or_default();
            let latitude = fields.get(lat_idx).and_then(|v| v.parse::<f64>().ok());
            let longitude = fields.get(lon_idx).and_then(|v| v.parse::<f64>().ok());

            match (latitude, longitude) {
                (Some(latitude), Some(longitude)) if !town.is_empty() => rows.push(TownRow {
                    town,
                    latitude,
                    longitude,
                }),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, "Skipped dataset rows without usable coordinates");
        }

        Ok(Self::from_rows(rows, radius_km))
    }

    /// Load the dataset from disk. A missing or unreadable file leaves the
    /// index empty so lookups fall through to the metro-area rule.
    pub fn load(path: impl AsRef<Path>, radius_km: f64) -> Self {
        let path = path.as_ref();

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("City dataset {} not readable ({}), proximity index is empty", path.display(), e);
                return Self::new(radius_km);
            }
        };

        // The published dataset is latin-1 encoded.
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        };

        match Self::from_csv_str(&text, radius_km) {
            Ok(index) => index,
            Err(e) => {
                warn!("City dataset {} rejected: {}", path.display(), e);
                Self::new(radius_km)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Distance in km between two towns, `f64::INFINITY` when unknown.
    ///
    /// Exact lowercase lookup first, then a lenient containment scan over
    /// every key and its neighbours so that "petaling jaya" still resolves
    /// against "petaling jaya new town". Abbreviations are not handled.
    pub fn distance_between(&self, city_a: &str, city_b: &str) -> f64 {
        let a = city_a.trim().to_lowercase();
        let b = city_b.trim().to_lowercase();

        if a.is_empty() || b.is_empty() {
            return f64::INFINITY;
        }

        if let Some(distance) = self.graph.get(&a).and_then(|n| n.get(&b)) {
            return *distance;
        }

        for (key, neighbours) in &self.graph {
            if !(key.contains(&a) || a.contains(key.as_str())) {
                continue;
            }
            for (neighbour, distance) in neighbours {
                if neighbour.contains(&b) || b.contains(neighbour.as_str()) {
                    return *distance;
                }
            }
        }

        f64::INFINITY
    }

    pub fn is_nearby(&self, city_a: &str, city_b: &str, radius_km: f64) -> bool {
        self.distance_between(city_a, city_b) <= radius_km
    }

    /// Towns within `max_km` of `city`, closest first. Exact key only.
    pub fn nearby_cities(&self, city: &str, max_km: f64) -> Vec<(String, f64)> {
        let Some(neighbours) = self.graph.get(&city.trim().to_lowercase()) else {
            return Vec::new();
        };

        let mut nearby: Vec<(String, f64)> = neighbours
            .iter()
            .filter(|(_, d)| **d <= max_km)
            .map(|(name, d)| (name.clone(), *d))
            .collect();
        nearby.sort_by(|x, y| x.1.total_cmp(&y.1));
        nearby
    }

    /// Both towns belong to the Klang Valley metro list.
    pub fn general_area_proximity(&self, city_a: &str, city_b: &str) -> bool {
        let a = city_a.trim().to_lowercase();
        let b = city_b.trim().to_lowercase();
        KL_SELANGOR_CITIES.contains(&a.as_str()) && KL_SELANGOR_CITIES.contains(&b.as_str())
    }
}

/// Comma-separated fields. Double-quoted fields may hold commas, and `""`
/// inside quotes is a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}
