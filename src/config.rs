use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::geo::DEFAULT_RADIUS_KM;
use crate::models::{Coordinates, Fare};

pub const DEFAULT_NLU_URL: &str = "http://localhost:5005";
pub const DEFAULT_GEO_DATASET: &str = "datamap/daerah-working-set.csv";
pub const DEFAULT_PORT: u16 = 5055;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Fallback requester location (Kuala Lumpur) when no address is on file.
pub const DEFAULT_LATITUDE: f64 = 3.1751817;
pub const DEFAULT_LONGITUDE: f64 = 101.6173767;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nlu_url: Option<String>,
    pub nlu_timeout: Duration,
    pub geo_dataset_path: String,
    pub proximity_radius_km: f64,
    pub default_fare: f64,
    pub default_coordinates: Coordinates,
    pub expertise_catalog_path: Option<String>,
    pub database_url: Option<String>,
    pub port: u16,
    /// Sessions untouched for this long are dropped from memory
    pub session_idle_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nlu_url: None,
            nlu_timeout: Duration::from_secs(5),
            geo_dataset_path: DEFAULT_GEO_DATASET.to_string(),
            proximity_radius_km: DEFAULT_RADIUS_KM,
            default_fare: Fare::DEFAULT_AMOUNT,
            default_coordinates: Coordinates::new(DEFAULT_LATITUDE, DEFAULT_LONGITUDE),
            expertise_catalog_path: None,
            database_url: None,
            port: DEFAULT_PORT,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to
    /// the defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            nlu_url: get("NLU_URL").or_else(|| {
                warn!("NLU_URL not set, using offline keyword classifier");
                None
            }),
            nlu_timeout: Duration::from_secs(parsed(&get, "NLU_TIMEOUT_SECS", 5u64)),
            geo_dataset_path: get("GEO_DATASET_PATH").unwrap_or_else(|| {
                warn!("GEO_DATASET_PATH not set, using default");
                defaults.geo_dataset_path.clone()
            }),
            proximity_radius_km: parsed(&get, "PROXIMITY_RADIUS_KM", defaults.proximity_radius_km),
            default_fare: parsed(&get, "DEFAULT_FARE", defaults.default_fare),
            default_coordinates: Coordinates::new(
                parsed(&get, "DEFAULT_LATITUDE", DEFAULT_LATITUDE),
                parsed(&get, "DEFAULT_LONGITUDE", DEFAULT_LONGITUDE),
            ),
            expertise_catalog_path: get("EXPERTISE_CATALOG_PATH"),
            database_url: get("POSTGRES_URL").or_else(|| get("DATABASE_URL")),
            port: get("PORT")
                .or_else(|| get("API_PORT"))
                .and_then(|p| match p.parse() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        warn!("Invalid port {:?}, using {}", p, DEFAULT_PORT);
                        None
                    }
                })
                .unwrap_or(DEFAULT_PORT),
            session_idle_timeout: Duration::from_secs(parsed(
                &get,
                "SESSION_IDLE_SECS",
                DEFAULT_SESSION_IDLE_SECS,
            )),
        };

        if config.database_url.is_none() {
            warn!("No POSTGRES_URL or DATABASE_URL set, bookings are kept in memory only");
        }

        config
    }

    pub fn has_database(&self) -> bool {
        self.database_url.is_some()
    }

    /// Default NLU address when the server is enabled without a URL.
    pub fn nlu_url_or_default(&self) -> &str {
        self.nlu_url.as_deref().unwrap_or(DEFAULT_NLU_URL)
    }
}

fn parsed<T: FromStr + Copy + std::fmt::Display>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using {}", key, raw, default);
            default
        }),
    }
}
