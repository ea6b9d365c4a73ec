//! EarthEngineClient against a scripted Earth Engine REST server.

use std::sync::Arc;

use earth_compute::{
    ComputeError, ComputeService, EarthEngineClient, EarthEngineConfig, IndexedGeometry,
    ZonalFeature, ZonalRequest,
};
use gcloud_client::{ApiClient, ClientConfig, GcloudError, RetryPolicy, StaticToken};
use serde_json::json;
use test_utils::{fixtures, MockResponse, MockServer};
use zonal_common::{wkt::parse_wkt, BandCalc, DateRange, Statistic};

fn client(server: &MockServer) -> EarthEngineClient {
    let api = ApiClient::new(
        Arc::new(StaticToken::new("ee-token")),
        ClientConfig {
            retry: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            ..ClientConfig::default()
        },
    )
    .unwrap();
    EarthEngineClient::new(
        api,
        EarthEngineConfig {
            endpoint: server.url(),
            project: "ee-project".to_string(),
        },
    )
}

fn request() -> ZonalRequest {
    ZonalRequest {
        collection: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
        date_range: DateRange::parse("2023-06-01", "2023-09-01").unwrap(),
        band_calc: BandCalc::default(),
        statistic: Statistic::Mean,
        scale: 10.0,
        features: vec![
            IndexedGeometry {
                row_index: 0,
                geometry: parse_wkt(fixtures::wkt::FIELD_A).unwrap(),
            },
            IndexedGeometry {
                row_index: 1,
                geometry: parse_wkt(fixtures::wkt::FIELD_B).unwrap(),
            },
        ],
    }
}

#[tokio::test]
async fn test_zonal_statistics() {
    let server = MockServer::start(|req| {
        if req.path == "/v1/projects/ee-project/value:compute" {
            MockResponse::ok(json!({
                "result": {
                    "type": "FeatureCollection",
                    "features": [
                        {"type": "Feature", "properties": {"row_index": 1, "nd": 0.25}},
                        {"type": "Feature", "properties": {"row_index": 0, "nd": 0.5}}
                    ]
                }
            }))
        } else {
            MockResponse::error(404, "not found")
        }
    })
    .await;

    let features = client(&server).zonal_statistics(&request()).await.unwrap();

    assert_eq!(
        features,
        vec![
            ZonalFeature { row_index: 1, value: Some(0.25), empty_collection: false },
            ZonalFeature { row_index: 0, value: Some(0.5), empty_collection: false },
        ]
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].header("authorization"), Some("Bearer ee-token"));

    let body = requests[0].json();
    let expression = &body["expression"];
    let result = expression["result"].as_str().unwrap();
    assert_eq!(
        expression["values"][result]["functionInvocationValue"]["functionName"],
        "Collection.map"
    );
    let text = body.to_string();
    assert!(text.contains("\"Reducer.mean\""));
    assert!(text.contains("\"COPERNICUS/S2_SR_HARMONIZED\""));
}

#[tokio::test]
async fn test_empty_collection() {
    let server = MockServer::start(|_| {
        MockResponse::ok(json!({
            "result": {
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"row_index": 0, "empty": 1}},
                    {"type": "Feature", "properties": {"row_index": 1, "empty": 1}}
                ]
            }
        }))
    })
    .await;

    let features = client(&server).zonal_statistics(&request()).await.unwrap();

    assert!(features.iter().all(|f| f.empty_collection && f.value.is_none()));
}

#[tokio::test]
async fn test_compute_error() {
    let server = MockServer::start(|_| {
        MockResponse::error(400, "Image.normalizedDifference: Pattern 'B8' did not match any bands.")
    })
    .await;

    let err = client(&server).zonal_statistics(&request()).await.unwrap_err();

    match err {
        ComputeError::Api(GcloudError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("did not match any bands"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_result() {
    let server = MockServer::start(|_| MockResponse::ok(json!({}))).await;

    let err = client(&server).zonal_statistics(&request()).await.unwrap_err();

    assert!(matches!(err, ComputeError::MalformedResult(_)));
}
