//! Integration tests for Deep Zoom descriptors, tiles and slide metadata.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use super::test_utils::{
    body_bytes, header, is_valid_jpeg, json_body, text_body, write_dicom_folder,
    write_raster_slide, write_tiled_slide, TestApp,
};

fn raster_app() -> TestApp {
    TestApp::with_slides(|dir| write_raster_slide(dir, "case1.svs", 600, 400))
}

// =============================================================================
// DZI
// =============================================================================

#[tokio::test]
async fn test_dzi_descriptor() {
    let app = raster_app();

    let response = app.get("/dzi/case1.svs.dzi").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/xml");
    assert!(header(&response, "cache-control").contains("max-age=3600"));

    let xml = text_body(response).await;
    assert!(xml.contains(r#"Format="jpeg""#));
    assert!(xml.contains(r#"Overlap="1""#));
    assert!(xml.contains(r#"TileSize="256""#));
    assert!(xml.contains(r#"<Size Height="400" Width="600"/>"#));
}

#[tokio::test]
async fn test_dzi_bare_name_resolves_svs() {
    let app = raster_app();
    let response = app.get("/dzi/case1.dzi").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dzi_missing_suffix_or_slide() {
    let app = raster_app();

    assert_eq!(app.get("/dzi/case1.svs").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/dzi/other.svs.dzi").await.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval() {
    let app = raster_app();

    let response = app.get("/tiles/case1.svs/10/1/0").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/tiles/case1.svs/10/1_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    assert_eq!(header(&response, "cache-control"), "public, max-age=3600");
    assert_eq!(header(&response, "x-tile-cache-hit"), "false");

    let data = body_bytes(response).await;
    assert!(is_valid_jpeg(&data));
    let tile = image::load_from_memory(&data).unwrap();
    assert_eq!((tile.width(), tile.height()), (258, 257));

    let response = app.get("/tiles/case1.svs/10/1_0.jpg").await;
    assert_eq!(header(&response, "x-tile-cache-hit"), "true");
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn test_edge_and_low_level_tiles() {
    let app = raster_app();

    let data = body_bytes(app.get("/tiles/case1.svs/10/2_1.jpeg").await).await;
    let tile = image::load_from_memory(&data).unwrap();
    assert_eq!((tile.width(), tile.height()), (89, 145));

    let data = body_bytes(app.get("/tiles/case1.svs/0/0_0.jpeg").await).await;
    let tile = image::load_from_memory(&data).unwrap();
    assert_eq!((tile.width(), tile.height()), (1, 1));
}

#[tokio::test]
async fn test_tile_head() {
    let app = raster_app();

    let request = Request::builder()
        .method("HEAD")
        .uri("/tiles/case1.svs/10/0_0.jpeg")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    assert!(body_bytes(response).await.is_empty());

    let request = Request::builder()
        .method("HEAD")
        .uri("/tiles/case1.svs/10/9_9.jpeg")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tile_level_out_of_range() {
    let app = raster_app();

    // 600x400 has 11 Deep Zoom levels: 0..=10
    let response = app.get("/tiles/case1.svs/11/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_coordinates");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_tile_outside_grid() {
    let app = raster_app();
    let response = app.get("/tiles/case1.svs/10/3_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_coordinates");
}

#[tokio::test]
async fn test_tile_bad_filename() {
    let app = raster_app();
    let response = app.get("/tiles/case1.svs/10/a_b.jpeg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_tile_unknown_slide() {
    let app = raster_app();
    let response = app.get("/tiles/missing.svs/0/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_undecodable_slide_is_unsupported() {
    let app = TestApp::with_slides(|dir| std::fs::write(dir.join("broken.ndpi"), b"not an image").unwrap());
    let response = app.get("/tiles/broken.ndpi/0/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_metadata_defaults() {
    let app = raster_app();

    let response = app.get("/metadata/case1.svs").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["levels"], 11);
    assert_eq!(body["tile_size"], 256);
    assert_eq!(body["max_width"], 600);
    assert_eq!(body["max_height"], 400);
    assert_eq!(body["level_dimensions"][10], json!([600, 400]));
    assert_eq!(body["diagnosis"], "Placeholder diagnosis");
    assert_eq!(body["clinicalDetails"], "Placeholder clinical details");
    assert!(body.get("metadata").is_none());
}

#[tokio::test]
async fn test_metadata_overlays_latest_report() {
    let app = raster_app();
    let profile_id = app.skin_profile().await;

    for diagnosis in ["Provisional", "BCC confirmed"] {
        let response = app
            .post_json(
                "/slides/case1.svs/report",
                &json!({ "profile_id": profile_id, "values": { "Diagnosis": diagnosis } }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let body = json_body(app.get("/metadata/case1.svs").await).await;
    assert_eq!(body["diagnosis"], "BCC confirmed");
    assert_eq!(body["microscopy"], "Placeholder microscopy data");
}

#[tokio::test]
async fn test_metadata_unknown_slide() {
    let app = raster_app();
    assert_eq!(
        app.get("/metadata/missing.svs").await.status(),
        StatusCode::NOT_FOUND
    );
}

// =============================================================================
// Tiled TIFF slides
// =============================================================================

async fn tile_of(app: &TestApp, uri: &str) -> image::RgbImage {
    let response = app.get(uri).await;
    assert_eq!(response.status(), StatusCode::OK, "{uri}");
    image::load_from_memory(&body_bytes(response).await).unwrap().to_rgb8()
}

#[tokio::test]
async fn test_tiled_tiff_slide() {
    let app = TestApp::with_slides(|dir| write_tiled_slide(dir, "scan.svs"));

    let xml = text_body(app.get("/dzi/scan.svs.dzi").await).await;
    assert!(xml.contains(r#"<Size Height="600" Width="1000"/>"#));

    let body = json_body(app.get("/metadata/scan.svs").await).await;
    assert_eq!(body["levels"], 11);
    assert_eq!(body["level_dimensions"][10], json!([1000, 600]));

    let tile = tile_of(&app, "/tiles/scan.svs/10/1_0.jpeg").await;
    assert_eq!(tile.dimensions(), (258, 257));
    let [r, g, b] = tile.get_pixel(128, 128).0;
    assert!(r > 150 && g < 90 && b < 90, "level 0 is red, got {r},{g},{b}");

    let tile = tile_of(&app, "/tiles/scan.svs/10/3_2.jpeg").await;
    assert_eq!(tile.dimensions(), (233, 89));

    // Read from the 500x300 level rather than downscaled from level 0
    let tile = tile_of(&app, "/tiles/scan.svs/9/0_0.jpeg").await;
    assert_eq!(tile.dimensions(), (257, 257));
    let [r, _, b] = tile.get_pixel(128, 128).0;
    assert!(b > 150 && r < 90, "level 1 is blue, got {r},{b}");
}

// =============================================================================
// DICOM folders
// =============================================================================

#[tokio::test]
async fn test_dicom_folder_metadata() {
    let app = TestApp::with_slides(|dir| write_dicom_folder(dir, "series", Some((512, 768))));

    let response = app.get("/metadata/series").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["levels"], 1);
    assert_eq!(body["max_width"], 768);
    assert_eq!(body["max_height"], 512);
    assert_eq!(body["level_dimensions"], json!([[768, 512]]));
    assert_eq!(body["metadata"]["(0008, 0060)"], "SM");
    assert_eq!(body["metadata"]["(0010, 0010)"], "Doe^Jane");
    assert!(body["metadata"].get("(7FE0, 0010)").is_none());
}

#[tokio::test]
async fn test_dicom_folder_without_dimensions() {
    let app = TestApp::with_slides(|dir| write_dicom_folder(dir, "series", None));

    let response = app.get("/metadata/series").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["levels"], 1);
    assert_eq!(body["max_width"], 1024);
    assert_eq!(body["max_height"], 1024);
    assert_eq!(body["level_dimensions"], json!([[1024, 1024]]));
    assert_eq!(body["metadata"]["(0008, 0060)"], "SM");
    assert!(body["metadata"].get("(0028, 0010)").is_none());
}

#[tokio::test]
async fn test_dicom_folder_tiles_unsupported() {
    let app = TestApp::with_slides(|dir| write_dicom_folder(dir, "series", Some((512, 768))));

    let response = app.get("/tiles/series/0/0_0.jpeg").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json_body(response).await["error"], "unsupported_format");

    let response = app.get("/dzi/series.dzi").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
