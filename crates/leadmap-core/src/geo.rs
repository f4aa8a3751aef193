// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::MapError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Rounds both components to `places` decimal digits.
    pub fn rounded(&self, places: i32) -> Self {
        let scale = 10f64.powi(places);
        Self {
            lat: (self.lat * scale).round() / scale,
            lng: (self.lng * scale).round() / scale,
        }
    }
}

/// Axis-aligned geographic rectangle in degrees.
///
/// Longitudes are never wrapped: a region crossing the anti-meridian simply
/// has `east > 180`. Callers that need wrapping must do it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Region {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self, MapError> {
        let region = Self {
            south,
            west,
            north,
            east,
        };
        if region.is_valid() {
            Ok(region)
        } else {
            Err(MapError::InvalidBounds(format!(
                "south={} west={} north={} east={}",
                south, west, north, east
            )))
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite())
            && self.south <= self.north
            && self.west <= self.east
    }

    pub fn south_west(&self) -> LatLng {
        LatLng::new(self.south, self.west)
    }

    pub fn north_east(&self) -> LatLng {
        LatLng::new(self.north, self.east)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    pub fn lng_span(&self) -> f64 {
        self.east - self.west
    }

    pub fn contains_point(&self, point: &LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    /// True when both corners of `other` lie inside `self`.
    pub fn contains(&self, other: &Region) -> bool {
        self.contains_point(&other.south_west()) && self.contains_point(&other.north_east())
    }

    /// Grows the region by `factor - 1` of each span on every side.
    pub fn expand(&self, factor: f64) -> Region {
        let grow = (factor - 1.0).max(0.0);
        let lat_pad = self.lat_span() * grow;
        let lng_pad = self.lng_span() * grow;
        Region {
            south: self.south - lat_pad,
            west: self.west - lng_pad,
            north: self.north + lat_pad,
            east: self.east + lng_pad,
        }
    }

    /// Smallest region containing every finite point, or `None` if there are none.
    pub fn bounding(points: &[LatLng]) -> Option<Region> {
        let mut finite = points.iter().filter(|p| p.is_finite());
        let first = finite.next()?;
        let mut region = Region {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        for p in finite {
            region.south = region.south.min(p.lat);
            region.north = region.north.max(p.lat);
            region.west = region.west.min(p.lng);
            region.east = region.east.max(p.lng);
        }
        Some(region)
    }
}

/// Free-function form used by the viewport controller.
pub fn expand(region: &Region, factor: f64) -> Region {
    region.expand(factor)
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4},{:.4} .. {:.4},{:.4}]",
            self.south, self.west, self.north, self.east
        )
    }
}

/// Parses `south,west,north,east`.
impl FromStr for Region {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| MapError::InvalidBounds(format!("{}: {}", s, e)))?;
        match parts.as_slice() {
            [south, west, north, east] => Region::new(*south, *west, *north, *east),
            _ => Err(MapError::InvalidBounds(format!(
                "expected south,west,north,east but got '{}'",
                s
            ))),
        }
    }
}

/// GeoJSON polygon as stored by the backend. Positions are `[lng, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

impl GeoPolygon {
    pub fn from_ring(ring: &[LatLng]) -> Self {
        Self {
            kind: "Polygon".to_string(),
            coordinates: vec![ring.iter().map(|p| vec![p.lng, p.lat]).collect()],
        }
    }

    /// Outer ring as lat/lng pairs. Malformed or non-finite positions are dropped.
    pub fn outer_ring(&self) -> Vec<LatLng> {
        if self.kind != "Polygon" {
            return Vec::new();
        }
        self.coordinates
            .first()
            .map(|ring| {
                ring.iter()
                    .filter_map(|pos| match pos.as_slice() {
                        [lng, lat, ..] => Some(LatLng::new(*lat, *lng)),
                        _ => None,
                    })
                    .filter(LatLng::is_finite)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Region {
        Region::new(40.0, -112.0, 41.0, -111.0).unwrap()
    }

    #[test]
    fn test_expand_by_one_is_identity() {
        let r = sample();
        assert_eq!(r.expand(1.0), r);
        assert_eq!(expand(&r, 1.0), r);
    }

    #[test]
    fn test_expand_grows_symmetrically() {
        let r = sample();
        let e = r.expand(2.0);
        assert!(e.contains(&r));
        assert!(e.south < r.south && e.north > r.north);
        assert!(e.west < r.west && e.east > r.east);
        assert_eq!(e.center(), r.center());
        assert!((e.lat_span() - 3.0).abs() < 1e-9);
        assert!((e.lng_span() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_expand_does_not_wrap_longitude() {
        let r = Region::new(-10.0, 170.0, 10.0, 179.0).unwrap();
        let e = r.expand(3.0);
        assert!(e.east > 180.0);
        assert!((e.east - 197.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_nan_and_inverted() {
        assert!(Region::new(f64::NAN, 0.0, 1.0, 1.0).is_err());
        assert!(Region::new(2.0, 0.0, 1.0, 1.0).is_err());
        assert!(Region::new(0.0, 5.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_contains_requires_both_corners() {
        let outer = Region::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let inner = Region::new(2.0, 2.0, 8.0, 8.0).unwrap();
        let straddling = Region::new(5.0, 5.0, 12.0, 8.0).unwrap();
        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&straddling));
    }

    #[test]
    fn test_bounding_skips_non_finite() {
        let pts = [
            LatLng::new(1.0, 2.0),
            LatLng::new(f64::NAN, 50.0),
            LatLng::new(-3.0, 4.0),
        ];
        let b = Region::bounding(&pts).unwrap();
        assert_eq!(b, Region::new(-3.0, 2.0, 1.0, 4.0).unwrap());
        assert!(Region::bounding(&[]).is_none());
    }

    #[test]
    fn test_parse_region() {
        let r: Region = "40, -112, 41, -111".parse().unwrap();
        assert_eq!(r, sample());
        assert!("1,2,3".parse::<Region>().is_err());
        assert!("a,b,c,d".parse::<Region>().is_err());
    }

    #[test]
    fn test_geo_polygon_ring_order() {
        let ring = vec![LatLng::new(1.0, 2.0), LatLng::new(3.0, 4.0)];
        let poly = GeoPolygon::from_ring(&ring);
        assert_eq!(poly.coordinates[0][0], vec![2.0, 1.0]);
        assert_eq!(poly.outer_ring(), ring);
    }
}
