use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ReportError, StoreError};
use crate::store::{self, Database};

use super::{LinkedObject, Narrative, PropertyRef, PropertyValue, Report, ReportValue};

/// Input for [`create_slide_report`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewSlideReport {
    pub profile_id: String,
    /// Raw values keyed by template property name
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub report_text: Option<String>,
}

/// Create a SLIDE report for `slide_name` against the profile's active template.
///
/// Each active-template property whose name appears in `input.values` gets one
/// value, coerced by the property datatype. Runs in one transaction: an
/// unparseable value leaves nothing behind.
pub fn create_slide_report(
    db: &Database,
    slide_name: &str,
    input: &NewSlideReport,
) -> Result<Report, ReportError> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        let slide = store::slides::find_slide_by_name(&tx, slide_name)?
            .ok_or_else(|| ReportError::NotFound(format!("Slide not found: {slide_name}")))?;

        let version = store::templates::load_active_version(&tx, &input.profile_id)?
            .ok_or_else(|| {
                ReportError::NotFound("No active template version found for this profile.".into())
            })?;

        let mut report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            linked_object: LinkedObject::slide(&slide.id),
            report_text: input.report_text.clone(),
            created_at: store::now_timestamp(),
            values: Vec::new(),
        };
        store::reports::insert_report(&tx, &report)?;

        for (group, prop) in version.properties() {
            let Some(raw) = input.values.get(&prop.name) else {
                debug!(group, property = %prop.name, "No value supplied");
                continue;
            };

            let datatype = prop.datatype_or_default();
            let value =
                PropertyValue::coerce(datatype, raw).ok_or_else(|| ReportError::InvalidValue {
                    property: prop.name.clone(),
                    datatype: datatype.to_string(),
                    value: raw.clone(),
                })?;

            let value = ReportValue {
                property: PropertyRef::new(prop.id),
                value,
            };
            store::reports::insert_report_value(&tx, &report.id, &value)?;
            report.values.push(value);
        }

        tx.commit()?;

        info!(
            slide = slide_name,
            report_id = %report.id,
            values = report.values.len(),
            "Created slide report"
        );
        Ok(report)
    })
}

/// Values of the latest SLIDE report for `slide_name`, keyed by property name.
///
/// Returns an empty map when the slide has no record or no report. Values
/// whose property reference no longer resolves are dropped.
pub fn slide_report_values(
    db: &Database,
    slide_name: &str,
) -> Result<HashMap<String, String>, StoreError> {
    db.with_conn(|conn| {
        let Some(slide) = store::slides::find_slide_by_name(conn, slide_name)? else {
            return Ok(HashMap::new());
        };
        let Some(report) = store::reports::latest_report_for(conn, &LinkedObject::slide(slide.id))?
        else {
            return Ok(HashMap::new());
        };

        let mut values = HashMap::new();
        for value in &report.values {
            match value.property.resolve_name(conn)? {
                Some(name) => {
                    values.insert(name, value.value.to_string());
                }
                None => debug!(
                    property_id = value.property.property_id,
                    report_id = %report.id,
                    "Report value references a missing property"
                ),
            }
        }
        debug!(slide = slide_name, count = values.len(), "Report values found");
        Ok(values)
    })
}

/// Narrative fields for `slide_name`: report values where present,
/// placeholders otherwise.
pub fn narrative_for_slide(db: &Database, slide_name: &str) -> Result<Narrative, StoreError> {
    let mut narrative = Narrative::default();
    narrative.overlay(&slide_report_values(db, slide_name)?);
    Ok(narrative)
}
