//! Table definitions.

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

/// Schema version recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables and indexes if they do not exist yet.
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current < SCHEMA_VERSION {
        info!(from = current, to = SCHEMA_VERSION, "Creating database schema");
    }

    conn.execute_batch(TEMPLATE_SCHEMA)?;
    conn.execute_batch(SLIDE_SCHEMA)?;
    conn.execute_batch(REPORT_SCHEMA)?;
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;

    Ok(())
}

const TEMPLATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS template_versions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id  TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    version     TEXT NOT NULL,
    is_active   INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_template_versions_active
    ON template_versions(profile_id, is_active);

CREATE TABLE IF NOT EXISTS template_groups (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    version_id  INTEGER NOT NULL REFERENCES template_versions(id) ON DELETE CASCADE,
    position    INTEGER NOT NULL,
    name        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_template_groups_version
    ON template_groups(version_id);

-- Neither group nor property names are unique: documents with repeated
-- names import as-is, and validation resolves a name to its last
-- occurrence in position order.
CREATE TABLE IF NOT EXISTS template_properties (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id      INTEGER NOT NULL REFERENCES template_groups(id) ON DELETE CASCADE,
    position      INTEGER NOT NULL,
    name          TEXT NOT NULL,
    datatype      TEXT,
    is_array      INTEGER NOT NULL DEFAULT 0,
    is_object     INTEGER NOT NULL DEFAULT 0,
    external_id   TEXT,
    json_path     TEXT,
    xml_path      TEXT,
    fhir_mapping  TEXT,
    hl7v2_path    TEXT,
    dicom_path    TEXT,
    constraints   TEXT
);

CREATE INDEX IF NOT EXISTS idx_template_properties_group
    ON template_properties(group_id);
"#;

const SLIDE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS slides (
    id               TEXT PRIMARY KEY,
    slide_name       TEXT NOT NULL UNIQUE,
    slide_label      TEXT,
    slide_barcode    TEXT,
    case_identifier  TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
"#;

const REPORT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    id                TEXT PRIMARY KEY,
    report_type       TEXT NOT NULL CHECK (report_type IN ('SLIDE', 'BLOCK', 'SPECIMEN', 'CASE')),
    linked_object_id  TEXT NOT NULL,
    report_text       TEXT,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_linked
    ON reports(report_type, linked_object_id);

CREATE TABLE IF NOT EXISTS report_property_values (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id    TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
    property_id  INTEGER NOT NULL,
    value_kind   TEXT NOT NULL CHECK (value_kind IN ('string', 'int', 'float', 'bool')),
    value_text   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_report_values_report
    ON report_property_values(report_id);
"#;
