//! Structural validation of an uploaded document against the active template.
//!
//! Checks group and property presence, `required`, and `allowed_values`.
//! Datatypes, array/object flags and path mappings are not compared.
//!
//! `allowed_values` is checked against the uploaded property's `value`
//! attribute. Import and export never read or write that attribute, so an
//! exported template re-uploaded as-is fails this check for every
//! constrained property.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::TemplateError;
use crate::store::Database;

use super::model::TemplateProperty;
use super::{active_version, group_elements, parse_document, property_elements};

/// Attribute holding the uploaded value checked against `allowed_values`.
pub const VALUE_ATTRIBUTE: &str = "value";

/// Validate `xml` against the active template of `profile_id`.
///
/// Returns the list of violations; empty means the document matches.
/// Never writes to the store. A parse failure or a missing active version
/// is reported as a single violation.
pub fn validate_template(
    db: &Database,
    xml: &str,
    profile_id: &str,
) -> Result<Vec<String>, TemplateError> {
    let doc = match parse_document(xml) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(profile_id, "Uploaded XML parsing failed: {}", e);
            return Ok(vec![e.to_string()]);
        }
    };

    let version = match active_version(db, profile_id) {
        Ok(version) => version,
        Err(TemplateError::NotFound(_)) => {
            warn!(profile_id, "No active template version found");
            return Ok(vec!["No active template version found for this profile.".into()]);
        }
        Err(e) => return Err(e),
    };

    // Expected: group name -> property name -> definition. Repeated group
    // or property names resolve to the last one in template order.
    let mut expected: Vec<(&str, HashMap<&str, &TemplateProperty>)> = Vec::new();
    for group in &version.groups {
        let props = group.properties.iter().map(|p| (p.name.as_str(), p)).collect();
        match expected.iter_mut().find(|(name, _)| *name == group.name) {
            Some(slot) => slot.1 = props,
            None => expected.push((group.name.as_str(), props)),
        }
    }

    let mut errors = Vec::new();

    // Uploaded: group name -> property name -> attributes
    let mut uploaded: HashMap<String, HashMap<String, HashMap<String, String>>> = HashMap::new();

    for group_el in group_elements(&doc) {
        let group_name = group_el.attribute("name").unwrap_or("").trim();
        if group_name.is_empty() {
            errors.push("Found a group with no 'name' attribute.".to_string());
            continue;
        }

        if !expected.iter().any(|(name, _)| *name == group_name) {
            errors.push(format!("Unexpected group: '{group_name}' not in template."));
            continue;
        }

        let mut props = HashMap::new();
        for prop_el in property_elements(group_el) {
            let prop_name = prop_el.attribute("name").unwrap_or("").trim();
            if prop_name.is_empty() {
                errors.push(format!("Group '{group_name}' has a property with no name."));
                continue;
            }
            let attrs = prop_el
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect();
            props.insert(prop_name.to_string(), attrs);
        }

        uploaded.insert(group_name.to_string(), props);
    }

    for (group_name, expected_props) in &expected {
        let uploaded_props = uploaded.get(*group_name);

        let mut names: Vec<&&str> = expected_props.keys().collect();
        names.sort_by_key(|name| {
            expected_props
                .get(**name)
                .map(|p| p.id)
                .unwrap_or_default()
        });

        for prop_name in names {
            let Some(definition) = expected_props.get(*prop_name) else {
                continue;
            };
            let Some(constraints) = &definition.constraints else {
                continue;
            };
            let attrs = uploaded_props.and_then(|props| props.get(*prop_name));

            match attrs {
                None if constraints.is_required() => {
                    errors.push(format!(
                        "Missing required property '{prop_name}' in group '{group_name}'."
                    ));
                }
                Some(attrs) => {
                    if let Some(allowed) = &constraints.allowed_values {
                        let actual = attrs.get(VALUE_ATTRIBUTE);
                        if !actual.is_some_and(|v| allowed.contains(v)) {
                            errors.push(format!(
                                "Property '{prop_name}' in group '{group_name}' has value '{}', \
                                 which is not in allowed list: {}",
                                actual.map(String::as_str).unwrap_or("None"),
                                format_allowed(allowed)
                            ));
                        }
                    }
                }
                None => {}
            }
        }
    }

    debug!(profile_id, violations = errors.len(), "Validated uploaded XML");
    Ok(errors)
}

fn format_allowed(allowed: &[String]) -> String {
    let quoted: Vec<String> = allowed.iter().map(|v| format!("'{v}'")).collect();
    format!("[{}]", quoted.join(", "))
}
