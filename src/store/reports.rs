//! Report and report value rows.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::report::{LinkedObject, PropertyRef, PropertyValue, Report, ReportValue};

/// Insert a report header. Values are written separately.
pub fn insert_report(conn: &Connection, report: &Report) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO reports (id, report_type, linked_object_id, report_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            report.id,
            report.linked_object.kind.as_str(),
            report.linked_object.id,
            report.report_text,
            report.created_at,
        ],
    )?;
    Ok(())
}

pub fn insert_report_value(
    conn: &Connection,
    report_id: &str,
    value: &ReportValue,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO report_property_values (report_id, property_id, value_kind, value_text)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            report_id,
            value.property.property_id,
            value.value.kind(),
            value.value.to_string(),
        ],
    )?;
    Ok(())
}

/// Most recent report linked to `subject`, with its values.
pub fn latest_report_for(
    conn: &Connection,
    subject: &LinkedObject,
) -> Result<Option<Report>, StoreError> {
    let header = conn
        .query_row(
            "SELECT id, report_text, created_at FROM reports
             WHERE report_type = ?1 AND linked_object_id = ?2
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            params![subject.kind.as_str(), subject.id],
            |row| {
                Ok(Report {
                    id: row.get(0)?,
                    linked_object: subject.clone(),
                    report_text: row.get(1)?,
                    created_at: row.get(2)?,
                    values: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut report) = header else {
        return Ok(None);
    };

    report.values = load_report_values(conn, &report.id)?;
    Ok(Some(report))
}

fn load_report_values(conn: &Connection, report_id: &str) -> Result<Vec<ReportValue>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT property_id, value_kind, value_text FROM report_property_values
         WHERE report_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![report_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(property_id, kind, text)| {
            Ok(ReportValue {
                property: PropertyRef::new(property_id),
                value: PropertyValue::from_storage(&kind, &text)?,
            })
        })
        .collect()
}
