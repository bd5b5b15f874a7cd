//! Geographic search regions
//!
//! A [`Region`] is the NW/SE corner pair an analyst types (or draws) to
//! describe where data should be collected. [`BBox`] is the same extent in
//! x/y (lon/lat) order, which is what the remote services and the tile
//! scheme speak.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Latitude shrink applied by [`Region::negative_buffer`], in degrees.
pub const LAT_BUFFER_DEG: f64 = 0.01;

/// Longitude shrink applied by [`Region::negative_buffer`], in metres.
pub const LON_BUFFER_M: f64 = LAT_BUFFER_DEG * 1000.0;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Parse `"lat, lon"` text, e.g. `"43.00, -69.00"`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidCoordinate {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = input.split(',').map(str::trim).collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("expected 'lat, lon', e.g. 43.00, -69.00"));
        }

        let lat: f64 = parts[0]
            .parse()
            .map_err(|_| invalid("latitude is not a number"))?;
        let lon: f64 = parts[1]
            .parse()
            .map_err(|_| invalid("longitude is not a number"))?;

        if !(-90.0..=90.0).contains(&lat) {
            return Err(invalid("latitude must be between 90 and -90"));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(invalid("longitude must be between 180 and -180"));
        }

        Ok(Self { lat, lon })
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.lat, self.lon)
    }
}

/// A lon/lat bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Check if two bboxes intersect. Shared edges count as intersecting.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Smallest bbox holding every point, or `None` for an empty iterator.
    pub fn enclosing<I>(points: I) -> Option<BBox>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => BBox::new(x, y, x, y),
                Some(b) => BBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            })
        })
    }

    /// Union of two bboxes.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Whether the box has zero width or height.
    pub fn is_degenerate(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }
}

/// A geographic search box given by its north-west and south-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub nw: GeoPoint,
    pub se: GeoPoint,
}

impl Region {
    pub fn new(nw: GeoPoint, se: GeoPoint) -> Self {
        Self { nw, se }
    }

    /// Parse and validate a typed corner pair.
    ///
    /// All problems are collected so the user can fix them in one pass. An NW
    /// longitude east of the SE longitude is a region crossing the
    /// antimeridian.
    pub fn from_corners(nw: &str, se: &str) -> Result<Self> {
        let mut problems = Vec::new();

        let nw = GeoPoint::parse(nw)
            .map_err(|e| problems.push(format!("NW point: {e}")))
            .ok();
        let se = GeoPoint::parse(se)
            .map_err(|e| problems.push(format!("SE point: {e}")))
            .ok();

        if let (Some(nw), Some(se)) = (nw, se) {
            if nw.lat <= se.lat {
                problems.push("NW point must lie north of the SE point".to_string());
            }
            if nw.lon == se.lon {
                problems.push("NW and SE points must not share a longitude".to_string());
            }
            if problems.is_empty() {
                return Ok(Self { nw, se });
            }
        }

        Err(Error::InvalidRegion(problems))
    }

    /// Whether the region wraps across 180° longitude.
    pub fn crosses_antimeridian(&self) -> bool {
        self.nw.lon > self.se.lon
    }

    /// The region as boxes that do not wrap: itself, or its parts east and
    /// west of the antimeridian.
    pub fn split_at_antimeridian(&self) -> Vec<Region> {
        if !self.crosses_antimeridian() {
            return vec![*self];
        }
        vec![
            Region::new(self.nw, GeoPoint::new(self.se.lat, 180.0)),
            Region::new(GeoPoint::new(self.nw.lat, -180.0), self.se),
        ]
    }

    /// The same extent as a lon/lat bbox.
    ///
    /// Only meaningful for regions that do not cross the antimeridian.
    pub fn bbox(&self) -> BBox {
        BBox::new(self.nw.lon, self.se.lat, self.se.lon, self.nw.lat)
    }

    pub fn from_bbox(bbox: &BBox) -> Self {
        Self {
            nw: GeoPoint::new(bbox.max_y, bbox.min_x),
            se: GeoPoint::new(bbox.min_y, bbox.max_x),
        }
    }

    /// Shrink the region so features that only share its boundary are
    /// excluded from intersection queries.
    ///
    /// Latitude shrinks by [`LAT_BUFFER_DEG`]; longitude by the equivalent of
    /// [`LON_BUFFER_M`] metres at the region's mean latitude.
    pub fn negative_buffer(&self) -> Region {
        let avg_lat = (self.nw.lat + self.se.lat) / 2.0;
        let del_lon = LON_BUFFER_M / (-11.364 * avg_lat.powi(2) - 245.76 * avg_lat + 112_345.0);

        Region {
            nw: GeoPoint::new(self.nw.lat - LAT_BUFFER_DEG, self.nw.lon + del_lon),
            se: GeoPoint::new(self.se.lat + LAT_BUFFER_DEG, self.se.lon - del_lon),
        }
    }

    /// WKT polygon tracing the region counter-clockwise from the SW corner.
    pub fn to_wkt_polygon(&self) -> String {
        let (nw_lat, nw_lon, se_lat, se_lon) = (self.nw.lat, self.nw.lon, self.se.lat, self.se.lon);
        format!(
            "POLYGON(({nw_lon} {se_lat}, {nw_lon} {nw_lat}, {se_lon} {nw_lat}, {se_lon} {se_lat}, {nw_lon} {se_lat}))"
        )
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NW ({}) SE ({})", self.nw, self.se)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_point() {
        let p = GeoPoint::parse("43.00, -69.00").unwrap();
        assert_eq!(p, GeoPoint::new(43.0, -69.0));

        let p = GeoPoint::parse("  42.5,-70.25 ").unwrap();
        assert_eq!(p, GeoPoint::new(42.5, -70.25));
    }

    #[test]
    fn parse_point_rejects_bad_input() {
        assert!(GeoPoint::parse("43.00").is_err());
        assert!(GeoPoint::parse("43.00, -69.00, 1").is_err());
        assert!(GeoPoint::parse("north, west").is_err());
        assert!(GeoPoint::parse("91.0, 0.0").is_err());
        assert!(GeoPoint::parse("0.0, -180.5").is_err());
    }

    #[test]
    fn region_collects_all_problems() {
        let err = Region::from_corners("95, 0", "0, 200").unwrap_err();
        let problems = err.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("NW point"));
        assert!(problems[1].starts_with("SE point"));
    }

    #[test]
    fn region_requires_nw_above_se() {
        let err = Region::from_corners("42.0, -70.0", "43.0, -69.0").unwrap_err();
        assert_eq!(err.problems(), vec!["NW point must lie north of the SE point".to_string()]);

        let err = Region::from_corners("43.0, -70.0", "42.0, -70.0").unwrap_err();
        assert_eq!(err.problems().len(), 1);
    }

    #[test]
    fn region_across_antimeridian() {
        let r = Region::from_corners("53.0, 172.0", "51.0, -178.0").unwrap();
        assert!(r.crosses_antimeridian());
        assert_eq!(
            r.split_at_antimeridian(),
            vec![
                Region::new(GeoPoint::new(53.0, 172.0), GeoPoint::new(51.0, 180.0)),
                Region::new(GeoPoint::new(53.0, -180.0), GeoPoint::new(51.0, -178.0)),
            ]
        );

        let plain = Region::from_corners("43.0, -70.0", "42.0, -69.0").unwrap();
        assert!(!plain.crosses_antimeridian());
        assert_eq!(plain.split_at_antimeridian(), vec![plain]);
    }

    #[test]
    fn region_bbox_roundtrip() {
        let r = Region::from_corners("43.0, -70.0", "42.0, -69.0").unwrap();
        let b = r.bbox();
        assert_eq!(b, BBox::new(-70.0, 42.0, -69.0, 43.0));
        assert_eq!(Region::from_bbox(&b), r);
    }

    #[test]
    fn negative_buffer_shrinks() {
        let r = Region::new(GeoPoint::new(43.0, -70.0), GeoPoint::new(42.0, -69.0));
        let b = r.negative_buffer();

        assert!((b.nw.lat - 42.99).abs() < 1e-12);
        assert!((b.se.lat - 42.01).abs() < 1e-12);

        let denom = -11.364 * 42.5f64.powi(2) - 245.76 * 42.5 + 112_345.0;
        let del_lon = 10.0 / denom;
        assert!((b.nw.lon - (-70.0 + del_lon)).abs() < 1e-12);
        assert!((b.se.lon - (-69.0 - del_lon)).abs() < 1e-12);
        // roughly 10 m of longitude at 42.5N
        assert!(del_lon > 1.0e-4 && del_lon < 1.5e-4);
    }

    #[test]
    fn wkt_polygon() {
        let r = Region::new(GeoPoint::new(43.5, -70.0), GeoPoint::new(42.0, -69.5));
        assert_eq!(
            r.to_wkt_polygon(),
            "POLYGON((-70 42, -70 43.5, -69.5 43.5, -69.5 42, -70 42))"
        );
    }

    #[test]
    fn bbox_intersects_counts_shared_edges() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 20.0, 10.0);
        let c = BBox::new(20.5, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn bbox_enclosing() {
        let b = BBox::enclosing(vec![(1.0, 5.0), (-2.0, 3.0), (4.0, -1.0)]).unwrap();
        assert_eq!(b, BBox::new(-2.0, -1.0, 4.0, 5.0));
        assert!(BBox::enclosing(Vec::new()).is_none());
    }
}
