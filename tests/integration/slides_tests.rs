//! Integration tests for the slide records and slide reports.

use axum::http::StatusCode;
use serde_json::json;

use pathway::{reconcile_slides, ScanError};

use super::test_utils::{json_body, write_dicom_folder, write_raster_slide, TestApp};

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_slides_list_empty() {
    let app = TestApp::empty();

    let response = app.get("/slides").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "slides": [] }));
}

#[tokio::test]
async fn test_slides_list_files_and_folders() {
    let app = TestApp::with_slides(|dir| {
        write_raster_slide(dir, "case1.svs", 64, 64);
        write_raster_slide(dir, "case2.tiff", 64, 64);
        write_raster_slide(dir, "photo.png", 64, 64);
        write_dicom_folder(dir, "series", Some((32, 32)));
        std::fs::create_dir(dir.join("empty")).unwrap();
    });

    let body = json_body(app.get("/slides").await).await;
    let mut names: Vec<&str> = body["slides"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["slide_name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, ["case1.svs", "case2.tiff", "series"]);

    let first = &body["slides"][0];
    assert!(first["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(first["slide_label"].is_null());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let app = TestApp::with_slides(|dir| write_raster_slide(dir, "case1.svs", 64, 64));

    let report = reconcile_slides(&app.db, app.dir.path()).unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.inserted, 0);

    write_raster_slide(app.dir.path(), "case2.svs", 64, 64);
    let report = reconcile_slides(&app.db, app.dir.path()).unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.inserted, 1);

    let body = json_body(app.get("/slides").await).await;
    assert_eq!(body["slides"].as_array().unwrap().len(), 2);
}

#[test]
fn test_reconcile_missing_directory() {
    let db = pathway::Database::open_in_memory().unwrap();
    let err = reconcile_slides(&db, std::path::Path::new("/nonexistent/slides")).unwrap_err();
    assert!(matches!(err, ScanError::Io { .. }));
}

// =============================================================================
// Reports
// =============================================================================

#[tokio::test]
async fn test_create_slide_report() {
    let app = TestApp::with_slides(|dir| write_raster_slide(dir, "case1.svs", 64, 64));
    let profile_id = app.skin_profile().await;

    let response = app
        .post_json(
            "/slides/case1.svs/report",
            &json!({
                "profile_id": profile_id,
                "values": { "Diagnosis": "BCC confirmed", "Unknown": "ignored" },
                "report_text": "Reviewed"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let report = json_body(response).await;
    assert_eq!(report["linked_object"]["kind"], "SLIDE");
    assert_eq!(report["report_text"], "Reviewed");
    assert_eq!(report["values"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_report_for_unknown_slide() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let response = app
        .post_json(
            "/slides/missing.svs/report",
            &json!({ "profile_id": profile_id, "values": {} }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_report_with_uncoercible_value() {
    let app = TestApp::with_slides(|dir| write_raster_slide(dir, "case1.svs", 64, 64));
    let profile_id = app.create_profile("Counts").await;
    let xml = r#"<Template><Group name="G"><Property name="Mitoses" type="int"/></Group></Template>"#;
    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/import"),
            "application/xml",
            xml,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .post_json(
            "/slides/case1.svs/report",
            &json!({ "profile_id": profile_id, "values": { "Mitoses": "many" } }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_value");
}
