//! Slide rows.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::slide::SlideRecord;

fn slide_from_row(row: &Row) -> Result<SlideRecord, rusqlite::Error> {
    Ok(SlideRecord {
        id: row.get("id")?,
        slide_name: row.get("slide_name")?,
        slide_label: row.get("slide_label")?,
        slide_barcode: row.get("slide_barcode")?,
        case_identifier: row.get("case_identifier")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SLIDE_COLUMNS: &str =
    "id, slide_name, slide_label, slide_barcode, case_identifier, created_at, updated_at";

/// Names of every persisted slide.
pub fn slide_names(conn: &Connection) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT slide_name FROM slides")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(names)
}

/// Insert a slide unless one with the same name exists. Returns whether a row was written.
pub fn insert_slide(conn: &Connection, slide: &SlideRecord) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT INTO slides (id, slide_name, slide_label, slide_barcode, case_identifier, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(slide_name) DO NOTHING",
        params![
            slide.id,
            slide.slide_name,
            slide.slide_label,
            slide.slide_barcode,
            slide.case_identifier,
            slide.created_at,
            slide.updated_at,
        ],
    )?;
    Ok(inserted > 0)
}

pub fn find_slide_by_name(conn: &Connection, name: &str) -> Result<Option<SlideRecord>, StoreError> {
    let slide = conn
        .query_row(
            &format!("SELECT {SLIDE_COLUMNS} FROM slides WHERE slide_name = ?1"),
            params![name],
            slide_from_row,
        )
        .optional()?;
    Ok(slide)
}

pub fn get_slide(conn: &Connection, id: &str) -> Result<Option<SlideRecord>, StoreError> {
    let slide = conn
        .query_row(
            &format!("SELECT {SLIDE_COLUMNS} FROM slides WHERE id = ?1"),
            params![id],
            slide_from_row,
        )
        .optional()?;
    Ok(slide)
}

/// All slides ordered by name.
pub fn list_slides(conn: &Connection) -> Result<Vec<SlideRecord>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLIDE_COLUMNS} FROM slides ORDER BY slide_name"
    ))?;
    let slides = stmt
        .query_map([], slide_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(slides)
}
