//! Template version, group and property rows.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::template::{Constraints, PathMappings, TemplateGroup, TemplateProperty, TemplateVersion};

/// Insert a version row and return its id.
pub fn insert_version(
    conn: &Connection,
    profile_id: &str,
    version: &str,
    active: bool,
    created_at: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO template_versions (profile_id, version, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![profile_id, version, active, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Clear the active flag on every version of a profile. Returns the number changed.
pub fn deactivate_versions(conn: &Connection, profile_id: &str) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE template_versions SET is_active = 0 WHERE profile_id = ?1 AND is_active = 1",
        params![profile_id],
    )?;
    Ok(changed)
}

/// Insert a group row and return its id.
pub fn insert_group(
    conn: &Connection,
    version_id: i64,
    position: usize,
    name: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO template_groups (version_id, position, name) VALUES (?1, ?2, ?3)",
        params![version_id, position as i64, name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a property row and return its id. The `id` field of `prop` is ignored.
pub fn insert_property(
    conn: &Connection,
    group_id: i64,
    position: usize,
    prop: &TemplateProperty,
) -> Result<i64, StoreError> {
    let constraints = prop
        .constraints
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO template_properties (
            group_id, position, name, datatype, is_array, is_object, external_id,
            json_path, xml_path, fhir_mapping, hl7v2_path, dicom_path, constraints
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            group_id,
            position as i64,
            prop.name,
            prop.datatype,
            prop.is_array,
            prop.is_object,
            prop.external_id,
            prop.mappings.json_path,
            prop.mappings.xml_path,
            prop.mappings.fhir_mapping,
            prop.mappings.hl7v2_path,
            prop.mappings.dicom_path,
            constraints,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Load the active version of a profile with its groups and properties.
///
/// When several versions are flagged active, the most recently imported one wins.
pub fn load_active_version(
    conn: &Connection,
    profile_id: &str,
) -> Result<Option<TemplateVersion>, StoreError> {
    let header = conn
        .query_row(
            "SELECT id, profile_id, version, is_active, created_at
             FROM template_versions
             WHERE profile_id = ?1 AND is_active = 1
             ORDER BY id DESC
             LIMIT 1",
            params![profile_id],
            |row| {
                Ok(TemplateVersion {
                    id: row.get(0)?,
                    profile_id: row.get(1)?,
                    version: row.get(2)?,
                    active: row.get(3)?,
                    created_at: row.get(4)?,
                    groups: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut version) = header else {
        return Ok(None);
    };

    version.groups = load_groups(conn, version.id)?;
    Ok(Some(version))
}

fn load_groups(conn: &Connection, version_id: i64) -> Result<Vec<TemplateGroup>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name FROM template_groups WHERE version_id = ?1 ORDER BY position, id",
    )?;
    let mut groups = stmt
        .query_map(params![version_id], |row| {
            Ok(TemplateGroup {
                id: row.get(0)?,
                name: row.get(1)?,
                properties: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, name, datatype, is_array, is_object, external_id,
                json_path, xml_path, fhir_mapping, hl7v2_path, dicom_path, constraints
         FROM template_properties
         WHERE group_id = ?1
         ORDER BY position, id",
    )?;

    for group in &mut groups {
        let rows = stmt
            .query_map(params![group.id], PropertyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        group.properties = rows
            .into_iter()
            .map(PropertyRow::into_property)
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(groups)
}

/// Raw property row before the constraints column is decoded.
struct PropertyRow {
    property: TemplateProperty,
    constraints: Option<String>,
}

impl PropertyRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            property: TemplateProperty {
                id: row.get(0)?,
                name: row.get(1)?,
                datatype: row.get(2)?,
                is_array: row.get(3)?,
                is_object: row.get(4)?,
                external_id: row.get(5)?,
                mappings: PathMappings {
                    json_path: row.get(6)?,
                    xml_path: row.get(7)?,
                    fhir_mapping: row.get(8)?,
                    hl7v2_path: row.get(9)?,
                    dicom_path: row.get(10)?,
                },
                constraints: None,
            },
            constraints: row.get(11)?,
        })
    }

    fn into_property(self) -> Result<TemplateProperty, StoreError> {
        let mut property = self.property;
        property.constraints = match self.constraints {
            Some(raw) => {
                let parsed: Constraints = serde_json::from_str(&raw)?;
                (!parsed.is_empty()).then_some(parsed)
            }
            None => None,
        };
        Ok(property)
    }
}

/// Read the path mappings of one property.
pub fn get_property_mappings(
    conn: &Connection,
    property_id: i64,
) -> Result<Option<PathMappings>, StoreError> {
    let mappings = conn
        .query_row(
            "SELECT json_path, xml_path, fhir_mapping, hl7v2_path, dicom_path
             FROM template_properties WHERE id = ?1",
            params![property_id],
            |row| {
                Ok(PathMappings {
                    json_path: row.get(0)?,
                    xml_path: row.get(1)?,
                    fhir_mapping: row.get(2)?,
                    hl7v2_path: row.get(3)?,
                    dicom_path: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(mappings)
}

/// Overwrite the path mappings of one property.
pub fn update_property_mappings(
    conn: &Connection,
    property_id: i64,
    mappings: &PathMappings,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE template_properties
         SET json_path = ?2, xml_path = ?3, fhir_mapping = ?4, hl7v2_path = ?5, dicom_path = ?6
         WHERE id = ?1",
        params![
            property_id,
            mappings.json_path,
            mappings.xml_path,
            mappings.fhir_mapping,
            mappings.hl7v2_path,
            mappings.dicom_path,
        ],
    )?;
    Ok(())
}

/// Row counts for one profile: (versions, groups, properties).
pub fn count_template_rows(
    conn: &Connection,
    profile_id: &str,
) -> Result<(i64, i64, i64), StoreError> {
    let counts = conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM template_versions WHERE profile_id = ?1),
            (SELECT COUNT(*) FROM template_groups g
                JOIN template_versions v ON v.id = g.version_id
                WHERE v.profile_id = ?1),
            (SELECT COUNT(*) FROM template_properties p
                JOIN template_groups g ON g.id = p.group_id
                JOIN template_versions v ON v.id = g.version_id
                WHERE v.profile_id = ?1)",
        params![profile_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(counts)
}

/// Number of versions currently flagged active for a profile.
pub fn count_active_versions(conn: &Connection, profile_id: &str) -> Result<i64, StoreError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM template_versions WHERE profile_id = ?1 AND is_active = 1",
        params![profile_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
