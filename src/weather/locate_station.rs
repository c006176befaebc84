use crate::types::station::{LatLon, Station, StationPoint};
use haversine::{distance, Location as HaversineLocation, Units};
use log::debug;
use ordered_float::OrderedFloat;
use rstar::RTree;

/// Kilometres per degree of latitude, rounded down so degree bounds derived
/// from it never undershoot.
const KM_PER_DEGREE: f64 = 110.0;

/// A station within reach of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateStation {
    pub station_id: u32,
    pub distance_km: f64,
}

/// Spatial index over the stations that report a usable position.
#[derive(Debug, Clone)]
pub struct StationLocator {
    rtree: RTree<StationPoint>,
}

impl StationLocator {
    pub fn new(stations: &[Station]) -> Self {
        let points: Vec<StationPoint> = stations
            .iter()
            .filter_map(|station| {
                let location = station.coordinates();
                if location.is_none() {
                    debug!("Station {} has no usable coordinates", station.station_id);
                }
                location.map(|location| StationPoint {
                    station_id: station.station_id,
                    location,
                })
            })
            .collect();
        StationLocator {
            rtree: RTree::bulk_load(points),
        }
    }

    /// Number of indexed stations.
    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every station within `radius_km` of `origin`, nearest first.
    ///
    /// The R-tree works in degrees, so it is queried with a radius large enough
    /// to cover the whole circle; the haversine distance then decides.
    pub fn within_radius(&self, origin: LatLon, radius_km: f64) -> Vec<CandidateStation> {
        if !(radius_km >= 0.0) {
            return vec![];
        }
        let mut candidates: Vec<CandidateStation> = self
            .rtree
            .locate_within_distance(
                [origin.latitude(), origin.longitude()],
                degree_bound(origin, radius_km).powi(2),
            )
            .filter_map(|point| {
                let distance_km = distance(
                    HaversineLocation {
                        latitude: origin.latitude(),
                        longitude: origin.longitude(),
                    },
                    HaversineLocation {
                        latitude: point.location.latitude(),
                        longitude: point.location.longitude(),
                    },
                    Units::Kilometers,
                );
                (distance_km <= radius_km).then_some(CandidateStation {
                    station_id: point.station_id,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by_key(|c| (OrderedFloat(c.distance_km), c.station_id));
        candidates
    }
}

/// Search radius in degrees covering `radius_km` around `origin`. A degree of
/// longitude shrinks with latitude, so the bound uses the latitude of the
/// circle's edge closest to a pole.
fn degree_bound(origin: LatLon, radius_km: f64) -> f64 {
    let latitude_span = radius_km / KM_PER_DEGREE;
    let edge_latitude = (origin.latitude().abs() + latitude_span).min(90.0);
    let shrink = edge_latitude.to_radians().cos();
    if shrink <= 0.01 {
        // Near the poles every longitude is in reach.
        return 360.0;
    }
    (std::f64::consts::SQRT_2 * latitude_span / shrink).min(360.0)
}
