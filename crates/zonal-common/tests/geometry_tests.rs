//! Geometry parsing tests against warehouse-style WKT.

use test_utils::assert_approx_eq;
use zonal_common::geometry::extent;
use zonal_common::wkt::{parse_wkt, to_wkt, WktError};
use zonal_common::Geometry;

// ============================================================================
// Warehouse output
// ============================================================================

#[test]
fn test_warehouse_polygon_is_reformatted_unchanged() {
    let wkt = "POLYGON((-121.5 38.5, -121.4 38.5, -121.4 38.6, -121.5 38.6, -121.5 38.5))";
    let geometry = parse_wkt(wkt).unwrap();
    assert_eq!(
        to_wkt(&geometry),
        "POLYGON ((-121.5 38.5, -121.4 38.5, -121.4 38.6, -121.5 38.6, -121.5 38.5))"
    );
}

#[test]
fn test_multipolygon() {
    let wkt = "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5), (5.2 5.1, 5.8 5.1, 5.8 5.5, 5.2 5.1)))";
    match parse_wkt(wkt).unwrap() {
        Geometry::MultiPolygon { coordinates } => {
            assert_eq!(coordinates.len(), 2);
            assert_eq!(coordinates[0].len(), 1);
            assert_eq!(coordinates[1].len(), 2);
        }
        other => panic!("expected multipolygon, got {:?}", other),
    }
}

#[test]
fn test_multipoint_both_forms() {
    let bare = parse_wkt("MULTIPOINT (10 40, 40 30)").unwrap();
    let wrapped = parse_wkt("MULTIPOINT ((10 40), (40 30))").unwrap();
    assert_eq!(bare, wrapped);
    assert_eq!(to_wkt(&bare), "MULTIPOINT ((10 40), (40 30))");
}

#[test]
fn test_geometry_collection() {
    let wkt = "GEOMETRYCOLLECTION(POINT(4 6), LINESTRING(4 6, 7 10))";
    let geometry = parse_wkt(wkt).unwrap();
    assert_eq!(
        geometry.to_string(),
        "GEOMETRYCOLLECTION (POINT (4 6), LINESTRING (4 6, 7 10))"
    );
}

#[test]
fn test_nested_empty_member_rejected() {
    let result = parse_wkt("GEOMETRYCOLLECTION(POINT(4 6), POINT EMPTY)");
    assert_eq!(result, Err(WktError::EmptyGeometry("POINT".to_string())));
}

// ============================================================================
// GeoJSON interchange
// ============================================================================

#[test]
fn test_wkt_to_geojson() {
    let geometry = parse_wkt("LINESTRING (30 10, 10 30)").unwrap();
    let json = serde_json::to_value(&geometry).unwrap();
    assert_eq!(json["type"], "LineString");
    assert_eq!(json["coordinates"][1][0], 10.0);
}

#[test]
fn test_geojson_to_wkt() {
    let json = r#"{"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]], [[2, 2], [3, 3]]]}"#;
    let geometry: Geometry = serde_json::from_str(json).unwrap();
    assert_eq!(to_wkt(&geometry), "MULTILINESTRING ((0 0, 1 1), (2 2, 3 3))");
}

#[test]
fn test_extent_of_parsed_features() {
    let geometries: Vec<Geometry> = [
        "POINT (-97.25 35.5)",
        "POLYGON ((-98 34.75, -97 34.75, -97 35, -98 35, -98 34.75))",
    ]
    .iter()
    .map(|w| parse_wkt(w).unwrap())
    .collect();

    let bbox = extent(&geometries).unwrap();
    assert_approx_eq!(bbox.min_x, -98.0, 1e-12);
    assert_approx_eq!(bbox.max_x, -97.0, 1e-12);
    assert_approx_eq!(bbox.height(), 0.75, 1e-12);
}
