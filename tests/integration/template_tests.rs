//! Integration tests for profiles, template import/validation/export and
//! mapping edits.

use axum::http::StatusCode;
use serde_json::json;

use pathway::active_version;

use super::test_utils::{header, json_body, text_body, TestApp, SKIN_TEMPLATE};

// =============================================================================
// Profiles
// =============================================================================

#[tokio::test]
async fn test_create_and_list_profiles() {
    let app = TestApp::empty();

    let id = app.create_profile("Skin").await;

    let response = app.get("/profiles").await;
    assert_eq!(response.status(), StatusCode::OK);
    let profiles = json_body(response).await;
    let profiles = profiles.as_array().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["id"], id.as_str());
    assert_eq!(profiles[0]["name"], "Skin");
}

#[tokio::test]
async fn test_duplicate_profile_name_rejected() {
    let app = TestApp::empty();
    app.create_profile("Skin").await;

    let response = app.post_json("/profiles", &json!({ "name": "Skin" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

// =============================================================================
// Import
// =============================================================================

#[tokio::test]
async fn test_import_reports_counts() {
    let app = TestApp::empty();
    let profile_id = app.create_profile("Skin").await;

    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/import?version=2024-03"),
            "application/xml",
            SKIN_TEMPLATE,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["version"], "2024-03");
    assert_eq!(body["groups"], 2);
    assert_eq!(body["properties"], 3);
}

#[tokio::test]
async fn test_active_template_json() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let response = app.get(&format!("/profiles/{profile_id}/template")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["version"], "v1");
    assert_eq!(body["groups"][0]["name"], "Summary");
    assert_eq!(body["groups"][0]["properties"][0]["name"], "Diagnosis");
    assert_eq!(body["groups"][0]["properties"][0]["hl7v2_path"], "OBX-5-1");
    assert_eq!(
        body["groups"][1]["properties"][0]["constraints"]["allowed_values"],
        json!(["Clear", "Involved"])
    );
}

#[tokio::test]
async fn test_import_malformed_xml() {
    let app = TestApp::empty();
    let profile_id = app.create_profile("Skin").await;

    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/import"),
            "application/xml",
            "<Template><Group name=\"A\">",
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "parse_error");
}

#[tokio::test]
async fn test_import_unknown_profile() {
    let app = TestApp::empty();

    let response = app
        .post("/profiles/missing/template/import", "application/xml", SKIN_TEMPLATE)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import_with_unnamed_property_rolls_back() {
    let app = TestApp::empty();
    let profile_id = app.create_profile("Skin").await;

    let xml = r#"<Template><Group name="A"><Property name="X"/><Property/></Group></Template>"#;
    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/import"),
            "application/xml",
            xml,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get(&format!("/profiles/{profile_id}/template")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_validate_matching_upload() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let upload = r#"<Template>
      <Group name="Summary"><Property name="Diagnosis"/></Group>
      <Group name="Margins"><Property name="Status" value="Clear"/></Group>
    </Template>"#;
    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/validate"),
            "application/xml",
            upload,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn test_validate_reports_violations() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let upload = r#"<Template>
      <Group name="Margins"><Property name="Status" value="Unknown"/></Group>
      <Group name="Extra"/>
    </Template>"#;
    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/validate"),
            "application/xml",
            upload,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["valid"], false);
    let errors: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e.as_str().unwrap())
        .collect();
    assert!(errors.contains(&"Unexpected group: 'Extra' not in template."));
    assert!(errors.contains(&"Missing required property 'Diagnosis' in group 'Summary'."));
    assert!(errors
        .iter()
        .any(|e| e.contains("has value 'Unknown', which is not in allowed list")));
}

#[tokio::test]
async fn test_validate_without_active_version() {
    let app = TestApp::empty();
    let profile_id = app.create_profile("Empty").await;

    let response = app
        .post(
            &format!("/profiles/{profile_id}/template/validate"),
            "application/xml",
            "<Template/>",
        )
        .await;
    let body = json_body(response).await;
    assert_eq!(
        body["errors"],
        json!(["No active template version found for this profile."])
    );
}

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn test_export_xml() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let response = app
        .get(&format!("/profiles/{profile_id}/template/export/xml"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/xml");
    assert_eq!(
        header(&response, "content-disposition"),
        "attachment; filename=\"template_export_v1.xml\""
    );

    let body = text_body(response).await;
    assert!(body.starts_with("<?xml"));
    assert!(body.contains(r#"<Group name="Margins">"#));
    assert!(body.contains(r#"hl7v2Path="OBX-5-2""#));
}

#[tokio::test]
async fn test_export_json() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let response = app
        .get(&format!("/profiles/{profile_id}/template/export/json"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-disposition"),
        "attachment; filename=\"template_export.json\""
    );

    let body: serde_json::Value = serde_json::from_str(&text_body(response).await).unwrap();
    assert_eq!(body["profile_id"], profile_id.as_str());
    assert_eq!(body["groups"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_export_hl7() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let response = app
        .get(&format!("/profiles/{profile_id}/template/export/hl7v2"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "text/plain");
    assert_eq!(
        header(&response, "content-disposition"),
        "attachment; filename=\"hl7_export.txt\""
    );
    assert_eq!(text_body(response).await, "OBX|||||Diagnosis^Microscopy");
}

#[tokio::test]
async fn test_export_hl7_skips_oversized_paths() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;
    let ids = property_ids(&app, &profile_id);

    let body = json!([
        { "id": ids[1], "hl7v2_path": "OBX-5-18446744073709551615" },
        { "id": ids[2], "hl7v2_path": "OBX-99999999999" },
    ]);
    let response = app.post_json("/template-properties/mappings", &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .get(&format!("/profiles/{profile_id}/template/export/hl7v2"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await, "OBX|||||Diagnosis");
}

#[tokio::test]
async fn test_export_unknown_format() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;

    let response = app
        .get(&format!("/profiles/{profile_id}/template/export/pdf"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Mappings
// =============================================================================

fn property_ids(app: &TestApp, profile_id: &str) -> Vec<i64> {
    active_version(&app.db, profile_id)
        .unwrap()
        .groups
        .iter()
        .flat_map(|g| g.properties.iter().map(|p| p.id))
        .collect()
}

#[tokio::test]
async fn test_update_mappings() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;
    let ids = property_ids(&app, &profile_id);

    let body = json!([
        { "id": ids[0], "fhir_mapping": "Observation.code" },
        { "id": ids[1].to_string(), "hl7v2_path": null },
    ]);
    let response = app.post_json("/template-properties/mappings", &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "status": "success", "updated": 2 })
    );

    let response = app
        .get(&format!("/profiles/{profile_id}/template/export/hl7v2"))
        .await;
    assert_eq!(text_body(response).await, "OBX|||||Diagnosis");

    let version = active_version(&app.db, &profile_id).unwrap();
    assert_eq!(
        version.groups[0].properties[0].mappings.fhir_mapping.as_deref(),
        Some("Observation.code")
    );
}

#[tokio::test]
async fn test_update_mappings_rolls_back_on_error() {
    let app = TestApp::empty();
    let profile_id = app.skin_profile().await;
    let ids = property_ids(&app, &profile_id);

    let body = json!([
        { "id": ids[0], "fhir_mapping": "Observation.code" },
        { "id": 999_999, "fhir_mapping": "x" },
    ]);
    let response = app.post_json("/template-properties/mappings", &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert!(!body["errors"].as_array().unwrap().is_empty());

    let version = active_version(&app.db, &profile_id).unwrap();
    assert_eq!(version.groups[0].properties[0].mappings.fhir_mapping, None);
}
