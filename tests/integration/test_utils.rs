//! Shared fixtures: slide directories, DICOM files and a ready router.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{Rgb, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use pathway::{
    create_router, reconcile_slides, AppState, Database, SlideOpener, RouterConfig,
    SlideRegistry, TileService,
};

/// A template with two groups, constraints and path mappings.
pub const SKIN_TEMPLATE: &str = r#"<Template>
  <Group name="Summary">
    <Property name="Diagnosis" constraints="required:true" hl7v2Path="OBX-5-1"/>
    <Property name="Microscopy" hl7v2Path="OBX-5-2"/>
  </Group>
  <Group name="Margins">
    <Property name="Status" constraints="allowed_values:Clear|Involved"/>
  </Group>
</Template>"#;

/// A router over a temporary slides directory and an in-memory database.
pub struct TestApp {
    pub dir: TempDir,
    pub db: Arc<Database>,
    pub router: Router,
}

impl TestApp {
    /// Build the app after `populate` has written slides into the directory.
    pub fn with_slides(populate: impl FnOnce(&Path)) -> Self {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let db = Arc::new(Database::open_in_memory().unwrap());
        reconcile_slides(&db, dir.path()).unwrap();

        let tiles = TileService::new(dir.path(), SlideRegistry::new(SlideOpener), Arc::clone(&db))
            .with_cache_capacity(4 * 1024 * 1024)
            .with_workers(2);
        let state = AppState::new(Arc::clone(&db), tiles);
        let router = create_router(state, RouterConfig::new().with_tracing(false));

        Self { dir, db, router }
    }

    pub fn empty() -> Self {
        Self::with_slides(|_| {})
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, content_type: &str, body: impl Into<Body>) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", content_type)
                .body(body.into())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Response<Body> {
        self.post(uri, "application/json", body.to_string()).await
    }

    /// Create a profile and return its id.
    pub async fn create_profile(&self, name: &str) -> String {
        let response = self
            .post_json("/profiles", &serde_json::json!({ "name": name }))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let profile = json_body(response).await;
        profile["id"].as_str().unwrap().to_string()
    }

    /// Create a profile and import [`SKIN_TEMPLATE`] into it.
    pub async fn skin_profile(&self) -> String {
        let profile_id = self.create_profile("Skin").await;
        let response = self
            .post(
                &format!("/profiles/{profile_id}/template/import"),
                "application/xml",
                SKIN_TEMPLATE,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        profile_id
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn text_body(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

/// Write a gradient image; the encoding follows the extension only for
/// `.png` and `.jpg`, anything else is written as PNG bytes.
pub fn write_raster_slide(dir: &Path, name: &str, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let format = match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => image::ImageFormat::Jpeg,
        _ => image::ImageFormat::Png,
    };
    img.save_with_format(dir.join(name), format).unwrap();
}

/// An Aperio-style tiled TIFF: 256px JPEG tiles, levels 1000x600 and 500x300.
pub fn write_tiled_slide(dir: &Path, name: &str) {
    const TILE: u32 = 256;
    let levels = [(1000u32, 600u32, Rgb([200, 40, 40])), (500, 300, Rgb([40, 40, 200]))];
    let description = b"Aperio Image Library v12.0.5\0";

    let mut out = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let description_at = out.len() as u32;
    out.extend_from_slice(description);

    let mut tables = Vec::new();
    for (width, height, color) in levels {
        let tile = image::DynamicImage::ImageRgb8(RgbImage::from_pixel(TILE, TILE, color));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        tile.write_to(&mut jpeg, image::ImageFormat::Jpeg).unwrap();
        let jpeg = jpeg.into_inner();

        let count = width.div_ceil(TILE) * height.div_ceil(TILE);
        let mut offsets = Vec::new();
        for _ in 0..count {
            offsets.push(out.len() as u32);
            out.extend_from_slice(&jpeg);
        }
        let offsets_at = out.len() as u32;
        offsets.iter().for_each(|o| out.extend_from_slice(&o.to_le_bytes()));
        let counts_at = out.len() as u32;
        (0..count).for_each(|_| out.extend_from_slice(&(jpeg.len() as u32).to_le_bytes()));
        tables.push((width, height, count, offsets_at, counts_at));
    }

    let mut link_at = 4;
    for (i, (width, height, count, offsets_at, counts_at)) in tables.into_iter().enumerate() {
        let ifd_at = out.len() as u32;
        out[link_at..link_at + 4].copy_from_slice(&ifd_at.to_le_bytes());

        let mut entries: Vec<(u16, u16, u32, u32)> = vec![
            (256, 4, 1, width),
            (257, 4, 1, height),
            (258, 3, 1, 8),
            (259, 3, 1, 7),
            (277, 3, 1, 3),
            (322, 4, 1, TILE),
            (323, 4, 1, TILE),
            (324, 4, count, offsets_at),
            (325, 4, count, counts_at),
        ];
        if i == 0 {
            entries.insert(4, (270, 2, description.len() as u32, description_at));
        }
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, kind, count, value) in entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        link_at = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    std::fs::write(dir.join(name), out).unwrap();
}

/// Check JPEG SOI and EOI markers.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

// =============================================================================
// DICOM
// =============================================================================

fn explicit_element(group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(vr);
    if matches!(vr, b"OB" | b"OW" | b"SQ" | b"UN" | b"UT") {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(value);
    out
}

/// A minimal explicit VR little endian DICOM file.
/// `dimensions` is `(rows, columns)`; `None` leaves both tags out.
pub fn dicom_file(dimensions: Option<(u16, u16)>) -> Vec<u8> {
    let mut data = vec![0u8; 128];
    data.extend_from_slice(b"DICM");
    data.extend(explicit_element(0x0002, 0x0010, b"UI", b"1.2.840.10008.1.2.1\0"));
    data.extend(explicit_element(0x0008, 0x0060, b"CS", b"SM"));
    data.extend(explicit_element(0x0010, 0x0010, b"PN", b"Doe^Jane"));
    if let Some((rows, columns)) = dimensions {
        data.extend(explicit_element(0x0028, 0x0010, b"US", &rows.to_le_bytes()));
        data.extend(explicit_element(0x0028, 0x0011, b"US", &columns.to_le_bytes()));
    }
    data.extend(explicit_element(0x7FE0, 0x0010, b"OB", &[0u8; 16]));
    data
}

/// A folder slide holding two DICOM instances.
pub fn write_dicom_folder(dir: &Path, name: &str, dimensions: Option<(u16, u16)>) {
    let folder = dir.join(name);
    std::fs::create_dir(&folder).unwrap();
    std::fs::write(folder.join("0001.dcm"), dicom_file(dimensions)).unwrap();
    std::fs::write(folder.join("0002.dcm"), dicom_file(dimensions)).unwrap();
}
