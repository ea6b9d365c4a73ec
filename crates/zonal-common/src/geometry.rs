//! Lon/lat geometry types.
//!
//! The serde representation is GeoJSON, which is what the compute service
//! accepts and returns. WKT conversion lives in [`crate::wkt`].

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// A `[longitude, latitude]` position.
pub type Position = [f64; 2];

/// A 2-D geometry in GeoJSON form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },

    MultiPoint {
        coordinates: Vec<Position>,
    },

    LineString {
        coordinates: Vec<Position>,
    },

    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },

    /// Linear rings; the first is the exterior, the rest are holes.
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },

    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },

    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    /// Create a point geometry.
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: [lon, lat],
        }
    }

    /// Create a polygon geometry from its rings.
    pub fn polygon(rings: Vec<Vec<Position>>) -> Self {
        Geometry::Polygon { coordinates: rings }
    }

    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// All positions of the geometry, in order.
    pub fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        self.collect_positions(&mut out);
        out
    }

    fn collect_positions(&self, out: &mut Vec<Position>) {
        match self {
            Geometry::Point { coordinates } => out.push(*coordinates),
            Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
                out.extend_from_slice(coordinates)
            }
            Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
                for part in coordinates {
                    out.extend_from_slice(part);
                }
            }
            Geometry::MultiPolygon { coordinates } => {
                for polygon in coordinates {
                    for ring in polygon {
                        out.extend_from_slice(ring);
                    }
                }
            }
            Geometry::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.collect_positions(out);
                }
            }
        }
    }

    /// Bounding box of the geometry, `None` if it has no positions.
    pub fn bbox(&self) -> Option<BoundingBox> {
        let positions = self.positions();
        let (first, rest) = positions.split_first()?;
        let mut bbox = BoundingBox::from_position(first[0], first[1]);
        for [x, y] in rest {
            bbox.expand(*x, *y);
        }
        Some(bbox)
    }
}

/// Combined bounding box of a set of geometries.
pub fn extent<'a>(geometries: impl IntoIterator<Item = &'a Geometry>) -> Option<BoundingBox> {
    geometries
        .into_iter()
        .filter_map(Geometry::bbox)
        .reduce(|acc, b| acc.union(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square() -> Geometry {
        Geometry::polygon(vec![vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [0.0, 0.0],
        ]])
    }

    #[test]
    fn test_serialize_point() {
        let json = serde_json::to_value(Geometry::point(-97.5, 35.2)).unwrap();
        assert_eq!(json, json!({"type": "Point", "coordinates": [-97.5, 35.2]}));
    }

    #[test]
    fn test_deserialize_polygon_ignores_extra_members() {
        let json = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]],
            "geodesic": false
        });
        let geometry: Geometry = serde_json::from_value(json).unwrap();
        assert_eq!(geometry, square());
    }

    #[test]
    fn test_geometry_collection_roundtrip() {
        let gc = Geometry::GeometryCollection {
            geometries: vec![Geometry::point(1.0, 2.0), square()],
        };
        let json = serde_json::to_string(&gc).unwrap();
        assert!(json.contains("\"geometries\""));
        let back: Geometry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, gc);
    }

    #[test]
    fn test_bbox() {
        assert_eq!(
            square().bbox(),
            Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0))
        );
        let empty = Geometry::GeometryCollection { geometries: vec![] };
        assert_eq!(empty.bbox(), None);
    }

    #[test]
    fn test_extent() {
        let geoms = vec![square(), Geometry::point(5.0, -2.0)];
        assert_eq!(
            extent(&geoms),
            Some(BoundingBox::new(0.0, -2.0, 5.0, 1.0))
        );
    }

    #[test]
    fn test_type_name() {
        assert_eq!(square().type_name(), "Polygon");
        assert_eq!(Geometry::point(0.0, 0.0).type_name(), "Point");
    }
}
