//! Per-feature zonal statistics requests and their results.

use serde_json::{json, Value};
use zonal_common::geometry::extent;
use zonal_common::{BandCalc, BoundingBox, DateRange, Geometry, Statistic};

use crate::error::{ComputeError, ComputeResult};
use crate::expression::{Expression, ExpressionBuilder, ValueNode};

/// Band name produced by a normalized difference.
pub const RESULT_BAND: &str = "nd";

/// Feature property carrying the input row position.
pub const ROW_INDEX_PROPERTY: &str = "row_index";

/// Feature property set when no image matched the filters.
pub const EMPTY_PROPERTY: &str = "empty";

/// Image property holding the acquisition time.
const TIME_START_PROPERTY: &str = "system:time_start";

/// A geometry tagged with the table row it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedGeometry {
    pub row_index: usize,
    pub geometry: Geometry,
}

/// One reduction of an image collection over a batch of features.
#[derive(Debug, Clone)]
pub struct ZonalRequest {
    /// Image collection ID, e.g. `COPERNICUS/S2_SR_HARMONIZED`
    pub collection: String,
    pub date_range: DateRange,
    pub band_calc: BandCalc,
    pub statistic: Statistic,
    /// Nominal reduction scale in metres
    pub scale: f64,
    pub features: Vec<IndexedGeometry>,
}

/// The reduced value for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalFeature {
    pub row_index: usize,
    /// `None` when the region had no valid pixels or no image matched
    pub value: Option<f64>,
    /// No image matched the date and bounds filters
    pub empty_collection: bool,
}

impl ZonalRequest {
    /// Combined bounds of the request's features.
    pub fn extent(&self) -> Option<BoundingBox> {
        extent(self.features.iter().map(|f| &f.geometry))
    }

    /// Build the expression graph for this request.
    ///
    /// The graph filters the collection by date and by the features' bounds,
    /// maps it to the normalized difference of the band pair, takes the
    /// first image and reduces it over each feature's geometry. Features get
    /// `empty = 1` instead when the filtered collection has no image.
    pub fn to_expression(&self) -> ComputeResult<Expression> {
        if self.features.is_empty() {
            return Err(ComputeError::NoFeatures);
        }

        let mut builder = ExpressionBuilder::new();

        let features = builder.share(feature_collection(&self.features));

        let loaded = ValueNode::invoke(
            "ImageCollection.load",
            [("id", ValueNode::constant(self.collection.as_str()))],
        );
        let by_date = ValueNode::invoke(
            "Collection.filter",
            [
                ("collection", loaded),
                ("filter", date_filter(&self.date_range)),
            ],
        );
        let by_bounds = ValueNode::invoke(
            "Collection.filter",
            [
                ("collection", by_date),
                (
                    "filter",
                    ValueNode::invoke(
                        "Filter.intersects",
                        [
                            ("leftField", ValueNode::constant(".all")),
                            ("rightValue", features.clone()),
                        ],
                    ),
                ),
            ],
        );

        let [nir, red] = self.band_calc.bands();
        let band_math = builder.function(
            "image",
            ValueNode::invoke(
                "Image.normalizedDifference",
                [
                    ("input", ValueNode::argument("image")),
                    ("bandNames", ValueNode::constant(json!([nir, red]))),
                ],
            ),
        );
        let mapped = ValueNode::invoke(
            "Collection.map",
            [("collection", by_bounds), ("baseAlgorithm", band_math)],
        );
        let first = builder.share(ValueNode::invoke("Collection.first", [("collection", mapped)]));

        let reduced = ValueNode::invoke(
            "Image.reduceRegion",
            [
                ("image", first.clone()),
                ("reducer", reducer(self.statistic)),
                (
                    "geometry",
                    ValueNode::invoke("Feature.geometry", [("feature", ValueNode::argument("feature"))]),
                ),
                ("scale", ValueNode::constant(self.scale)),
            ],
        );
        let properties = ValueNode::invoke(
            "Algorithms.If",
            [
                (
                    "condition",
                    ValueNode::invoke(
                        "Algorithms.IsEqual",
                        [("left", first), ("right", ValueNode::null())],
                    ),
                ),
                (
                    "trueCase",
                    ValueNode::dictionary([(EMPTY_PROPERTY, ValueNode::constant(1))]),
                ),
                ("falseCase", reduced),
            ],
        );
        let per_feature = builder.function(
            "feature",
            ValueNode::invoke(
                "Element.setMulti",
                [
                    ("object", ValueNode::argument("feature")),
                    ("properties", properties),
                ],
            ),
        );

        Ok(builder.build(ValueNode::invoke(
            "Collection.map",
            [("collection", features), ("baseAlgorithm", per_feature)],
        )))
    }
}

/// Reducer invocation for a statistic.
pub fn reducer(statistic: Statistic) -> ValueNode {
    ValueNode::invoke(
        &format!("Reducer.{}", statistic.as_str()),
        Vec::<(&str, ValueNode)>::new(),
    )
}

fn date_filter(range: &DateRange) -> ValueNode {
    ValueNode::invoke(
        "Filter.dateRangeContains",
        [
            (
                "leftValue",
                ValueNode::invoke(
                    "DateRange",
                    [
                        ("start", ValueNode::constant(range.start_millis())),
                        ("end", ValueNode::constant(range.end_millis())),
                    ],
                ),
            ),
            ("rightField", ValueNode::constant(TIME_START_PROPERTY)),
        ],
    )
}

fn feature_collection(features: &[IndexedGeometry]) -> ValueNode {
    let features = features
        .iter()
        .map(|f| {
            ValueNode::invoke(
                "Feature",
                [
                    ("geometry", geometry_node(&f.geometry)),
                    (
                        "metadata",
                        ValueNode::dictionary([(
                            ROW_INDEX_PROPERTY,
                            ValueNode::constant(f.row_index as u64),
                        )]),
                    ),
                ],
            )
        })
        .collect();
    ValueNode::invoke("Collection", [("features", ValueNode::array(features))])
}

/// Geometry constructor invocation for a geometry.
pub fn geometry_node(geometry: &Geometry) -> ValueNode {
    match geometry {
        Geometry::Point { coordinates: c } => ValueNode::invoke(
            "GeometryConstructors.Point",
            [("coordinates", ValueNode::constant(json!(c)))],
        ),
        Geometry::MultiPoint { coordinates: c } => ValueNode::invoke(
            "GeometryConstructors.MultiPoint",
            [("coordinates", ValueNode::constant(json!(c)))],
        ),
        Geometry::LineString { coordinates: c } => ValueNode::invoke(
            "GeometryConstructors.LineString",
            [("coordinates", ValueNode::constant(json!(c)))],
        ),
        Geometry::MultiLineString { coordinates: c } => ValueNode::invoke(
            "GeometryConstructors.MultiLineString",
            [("coordinates", ValueNode::constant(json!(c)))],
        ),
        Geometry::Polygon { coordinates: c } => ValueNode::invoke(
            "GeometryConstructors.Polygon",
            [
                ("coordinates", ValueNode::constant(json!(c))),
                ("evenOdd", ValueNode::constant(true)),
            ],
        ),
        Geometry::MultiPolygon { coordinates: c } => ValueNode::invoke(
            "GeometryConstructors.MultiPolygon",
            [
                ("coordinates", ValueNode::constant(json!(c))),
                ("evenOdd", ValueNode::constant(true)),
            ],
        ),
        Geometry::GeometryCollection { geometries } => ValueNode::invoke(
            "GeometryConstructors.MultiGeometry",
            [(
                "geometries",
                ValueNode::array(geometries.iter().map(geometry_node).collect()),
            )],
        ),
    }
}

/// Read per-feature values out of a computed FeatureCollection.
pub fn parse_features(result: &Value) -> ComputeResult<Vec<ZonalFeature>> {
    let features = result
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ComputeError::MalformedResult("result has no features array".to_string()))?;

    features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let properties = feature.get("properties").filter(|p| p.is_object());
            let property = |name: &str| properties.and_then(|p| p.get(name));

            let raw_index = property(ROW_INDEX_PROPERTY).ok_or_else(|| {
                ComputeError::MalformedResult(format!("feature {} has no {}", i, ROW_INDEX_PROPERTY))
            })?;
            let row_index = as_row_index(raw_index).ok_or_else(|| {
                ComputeError::MalformedResult(format!(
                    "feature {} has invalid {}: {}",
                    i, ROW_INDEX_PROPERTY, raw_index
                ))
            })?;

            Ok(ZonalFeature {
                row_index: row_index as usize,
                value: property(RESULT_BAND).and_then(Value::as_f64),
                empty_collection: property(EMPTY_PROPERTY).and_then(Value::as_f64) == Some(1.0),
            })
        })
        .collect()
}

/// Accept integral non-negative numbers only. Earth Engine may echo an
/// integer property back as a float, so `3.0` is fine but `1.5` is not.
fn as_row_index(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}
