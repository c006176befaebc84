//! Defines the IMS weather station metadata, the `LatLon` coordinate type used
//! throughout the pipeline, and the spatial-index point the station locator
//! is built from.

use rstar::{PointDistance, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographical coordinate: latitude first, longitude second, in decimal degrees.
///
/// # Examples
///
/// ```
/// use kit_data_merger::LatLon;
///
/// let tel_aviv = LatLon(32.0853, 34.7818);
/// assert_eq!(tel_aviv.0, 32.0853);
/// assert_eq!(LatLon::parse("32.0853, 34.7818"), Some(tel_aviv));
/// assert_eq!(LatLon::parse("32.0853 34.7818"), Some(tel_aviv));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    /// Parses a `"lat,lon"` or `"lat lon"` pair.
    ///
    /// A comma, when present, is the only separator; otherwise the pair is
    /// split on whitespace. Exactly two finite numbers must remain, and they
    /// must be a valid latitude/longitude.
    pub fn parse(text: &str) -> Option<LatLon> {
        let text = text.trim();
        let parts: Vec<&str> = if text.contains(',') {
            text.split(',').map(str::trim).collect()
        } else {
            text.split_whitespace().collect()
        };
        let [lat, lon] = parts.as_slice() else {
            return None;
        };
        let lat = lat.parse::<f64>().ok()?;
        let lon = lon.parse::<f64>().ok()?;
        let coordinate = LatLon(lat, lon);
        coordinate.is_valid().then_some(coordinate)
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-90.0..=90.0).contains(&self.0)
            && (-180.0..=180.0).contains(&self.1)
    }

    pub fn latitude(&self) -> f64 {
        self.0
    }

    pub fn longitude(&self) -> f64 {
        self.1
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

/// A single station of the IMS "envista" network, as returned by `/v1/envista/stations`.
///
/// Only the fields the pipeline needs are kept; unknown fields are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Numeric IMS station identifier.
    pub station_id: u32,
    /// Human readable station name.
    #[serde(default)]
    pub name: String,
    /// Station position. Either coordinate may be missing in the provider data.
    #[serde(default)]
    pub location: StationLocation,
    /// Whether the station is currently reporting.
    #[serde(default)]
    pub active: bool,
}

/// Raw coordinates of a station as reported by the provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StationLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Station {
    /// The station's position, or `None` when the provider reported missing or
    /// out-of-range coordinates. Such stations are never selected as candidates.
    pub fn coordinates(&self) -> Option<LatLon> {
        let coordinate = LatLon(self.location.latitude?, self.location.longitude?);
        coordinate.is_valid().then_some(coordinate)
    }
}

/// A station reduced to what the spatial index needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StationPoint {
    pub station_id: u32,
    pub location: LatLon,
}

/// A station is a degenerate (single point) box in (latitude, longitude) space.
impl RTreeObject for StationPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.0, self.location.1])
    }
}

/// Squared Euclidean distance in degree space. Only used to pre-select
/// stations; the real distance is the haversine distance in kilometres.
impl PointDistance for StationPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.location.0 - point[0];
        let dy = self.location.1 - point[1];
        dx * dx + dy * dy
    }
}
