//! Free-text location lookup against a Nominatim-compatible provider, with
//! per-run memoization and a fixed minimum spacing between provider calls.

use crate::config::GeocodingConfig;
use crate::types::Coordinates;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request for '{query}' failed: {reason}")]
    Request { query: String, reason: String },
    #[error("unreadable geocoding response for '{query}': {source}")]
    Decode {
        query: String,
        #[source]
        source: io::Error,
    },
}

pub trait Geocoder {
    /// `Ok(None)` means the provider answered but had no match.
    fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// Builds the location string sent to the provider for one facility.
pub fn location_query(name: &str, region: &str, country: &str) -> String {
    format!("{name}, {region}, {country}")
}

pub struct NominatimGeocoder {
    agent: ureq::Agent,
    search_url: String,
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            search_url: format!("{}/search", config.base_url.trim_end_matches('/')),
        }
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let response = self
            .agent
            .get(&self.search_url)
            .query("q", query)
            .query("format", "json")
            .query("limit", "1")
            .call()
            .map_err(|err| GeocodeError::Request {
                query: query.to_string(),
                reason: err.to_string(),
            })?;

        let places: Vec<NominatimPlace> =
            response.into_json().map_err(|source| GeocodeError::Decode {
                query: query.to_string(),
                source,
            })?;

        Ok(places.first().and_then(|place| {
            let lat = place.lat.parse().ok()?;
            let lon = place.lon.parse().ok()?;
            Coordinates::new(lat, lon)
        }))
    }
}

/// Blocks the calling thread so that successive calls are at least `min_interval` apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Cache-first resolver. Failed lookups are remembered as `None` like any other answer.
pub struct GeocodeCache<G> {
    geocoder: G,
    limiter: RateLimiter,
    entries: HashMap<String, Option<Coordinates>>,
    provider_calls: usize,
}

impl<G: Geocoder> GeocodeCache<G> {
    pub fn new(geocoder: G, limiter: RateLimiter) -> Self {
        Self {
            geocoder,
            limiter,
            entries: HashMap::new(),
            provider_calls: 0,
        }
    }

    pub fn resolve(&mut self, query: &str) -> Option<Coordinates> {
        if let Some(cached) = self.entries.get(query) {
            return *cached;
        }

        self.limiter.wait();
        self.provider_calls += 1;
        let resolved = match self.geocoder.geocode(query) {
            Ok(found) => found,
            Err(err) => {
                debug!("{err}");
                None
            }
        };
        if resolved.is_none() {
            debug!("No coordinates for '{query}'");
        }

        self.entries.insert(query.to_string(), resolved);
        resolved
    }

    /// Number of requests actually sent to the provider.
    pub fn provider_calls(&self) -> usize {
        self.provider_calls
    }
}

impl GeocodeCache<NominatimGeocoder> {
    pub fn nominatim(config: &GeocodingConfig) -> Self {
        Self::new(
            NominatimGeocoder::new(config),
            RateLimiter::new(Duration::from_millis(config.min_delay_ms)),
        )
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Answers from a fixed table; queries listed in `failing` return a request error.
    #[derive(Default)]
    pub struct StaticGeocoder {
        pub known: HashMap<String, Coordinates>,
        pub failing: Vec<String>,
    }

    impl StaticGeocoder {
        pub fn with(mut self, query: &str, latitude: f64, longitude: f64) -> Self {
            let coordinates = Coordinates::new(latitude, longitude).unwrap();
            self.known.insert(query.to_string(), coordinates);
            self
        }

        pub fn failing_on(mut self, query: &str) -> Self {
            self.failing.push(query.to_string());
            self
        }
    }

    impl Geocoder for StaticGeocoder {
        fn geocode(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
            if self.failing.iter().any(|q| q == query) {
                return Err(GeocodeError::Request {
                    query: query.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(self.known.get(query).copied())
        }
    }

    pub fn cache(geocoder: StaticGeocoder) -> GeocodeCache<StaticGeocoder> {
        GeocodeCache::new(geocoder, RateLimiter::new(Duration::ZERO))
    }
}
