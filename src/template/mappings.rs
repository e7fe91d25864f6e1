//! Batch edits of property path mappings.
//!
//! A batch is all-or-nothing: every item is checked, errors are collected
//! across the whole batch, and a single error rolls back every change.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::MappingUpdateError;
use crate::store::{self, Database};

use super::model::PathMappings;

/// Mapping fields accepted in an update item.
pub const MAPPING_FIELDS: [&str; 5] = [
    "json_path",
    "xml_path",
    "fhir_mapping",
    "hl7v2_path",
    "dicom_path",
];

/// Parsed update for one property.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingUpdate {
    pub property_id: i64,
    pub json_path: Option<Option<String>>,
    pub xml_path: Option<Option<String>>,
    pub fhir_mapping: Option<Option<String>>,
    pub hl7v2_path: Option<Option<String>>,
    pub dicom_path: Option<Option<String>>,
}

impl MappingUpdate {
    /// Parse item `index` of a request body, appending any problems to `errors`.
    fn from_json(index: usize, item: &Value, errors: &mut Vec<String>) -> Option<Self> {
        let Some(object) = item.as_object() else {
            errors.push(format!("Item {index} is not an object"));
            return None;
        };

        let property_id = match object.get("id") {
            None | Some(Value::Null) => {
                errors.push(format!("Missing 'id' in item {index}"));
                return None;
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                errors.push(format!("Missing 'id' in item {index}"));
                return None;
            }
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(_) => None,
        };
        let Some(property_id) = property_id else {
            errors.push(format!("Invalid 'id' in item {index}"));
            return None;
        };

        let mut update = MappingUpdate {
            property_id,
            ..Default::default()
        };
        let mut valid = true;

        for field in MAPPING_FIELDS {
            let value = match object.get(field) {
                None => continue,
                Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => {
                    errors.push(format!(
                        "Invalid value for '{field}' in property {property_id}"
                    ));
                    valid = false;
                    continue;
                }
            };
            match field {
                "json_path" => update.json_path = Some(value),
                "xml_path" => update.xml_path = Some(value),
                "fhir_mapping" => update.fhir_mapping = Some(value),
                "hl7v2_path" => update.hl7v2_path = Some(value),
                _ => update.dicom_path = Some(value),
            }
        }

        valid.then_some(update)
    }

    /// Apply the present fields onto `mappings`.
    pub fn apply(&self, mappings: &mut PathMappings) {
        let patches = [
            (&self.json_path, &mut mappings.json_path),
            (&self.xml_path, &mut mappings.xml_path),
            (&self.fhir_mapping, &mut mappings.fhir_mapping),
            (&self.hl7v2_path, &mut mappings.hl7v2_path),
            (&self.dicom_path, &mut mappings.dicom_path),
        ];
        for (patch, target) in patches {
            if let Some(value) = patch {
                *target = value.clone();
            }
        }
    }
}

/// Apply a batch of mapping updates given as a JSON list.
///
/// Returns the number of properties updated.
pub fn update_mappings(db: &Database, body: &Value) -> Result<usize, MappingUpdateError> {
    let Some(items) = body.as_array() else {
        return Err(MappingUpdateError::InvalidPayload);
    };

    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let mut errors = Vec::new();
        let mut updated = 0;

        for (index, item) in items.iter().enumerate() {
            let Some(update) = MappingUpdate::from_json(index, item, &mut errors) else {
                continue;
            };

            let Some(mut mappings) =
                store::templates::get_property_mappings(&tx, update.property_id)?
            else {
                errors.push(format!("Property with id {} not found.", update.property_id));
                continue;
            };

            update.apply(&mut mappings);
            store::templates::update_property_mappings(&tx, update.property_id, &mappings)?;
            debug!(property_id = update.property_id, ?mappings, "Updated property mappings");
            updated += 1;
        }

        if !errors.is_empty() {
            warn!(errors = errors.len(), "Mapping update failed, rolling back");
            return Err(MappingUpdateError::Rejected(errors));
        }

        tx.commit()?;
        info!(updated, "Mapping update committed");
        Ok(updated)
    })
}
