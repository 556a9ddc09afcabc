//! Named fallback policy for missing geocoordinates.
//!
//! When the understanding service returns an address without coordinates,
//! the incident still needs a map position. The policy jitters a fixed
//! reference point by up to ±`spread` degrees on both axes. Center and
//! spread are injectable so tests can pin the RNG and the reference.

use rand::Rng;

/// Default reference point: lower Manhattan.
pub const DEFAULT_CENTER: (f64, f64) = (40.7128, -74.0060);

/// Default jitter half-width in degrees (≈ 2.8 km north-south).
pub const DEFAULT_SPREAD: f64 = 0.025;

/// Deterministic-when-seeded coordinate fallback.
#[derive(Debug, Clone, Copy)]
pub struct GeoFallback {
    pub center: (f64, f64),
    pub spread: f64,
}

impl Default for GeoFallback {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            spread: DEFAULT_SPREAD,
        }
    }
}

impl GeoFallback {
    pub fn new(center: (f64, f64), spread: f64) -> Self {
        Self { center, spread }
    }

    /// Sample a position within the spread box around the center.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> (f64, f64) {
        let lat = self.center.0 + rng.gen_range(-self.spread..=self.spread);
        let lng = self.center.1 + rng.gen_range(-self.spread..=self.spread);
        (lat, lng)
    }
}
