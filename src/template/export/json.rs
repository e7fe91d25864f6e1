use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::TemplateError;
use crate::template::model::{TemplateGroup, TemplateProperty, TemplateVersion};

pub const JSON_EXPORT_FILENAME: &str = "template_export.json";

/// Export document. Every field is written, nulls included.
#[derive(Serialize)]
struct JsonTemplate<'a> {
    version: &'a str,
    profile_id: &'a str,
    groups: Vec<JsonGroup<'a>>,
}

#[derive(Serialize)]
struct JsonGroup<'a> {
    name: &'a str,
    properties: Vec<JsonProperty<'a>>,
}

#[derive(Serialize)]
struct JsonProperty<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    datatype: Option<&'a str>,
    is_array: bool,
    is_object: bool,
    external_id: Option<&'a str>,
    json_path: Option<&'a str>,
    xml_path: Option<&'a str>,
    fhir_mapping: Option<&'a str>,
    hl7v2_path: Option<&'a str>,
    dicom_path: Option<&'a str>,
    /// Absent constraints are written as `{}`
    constraints: Value,
}

impl<'a> JsonProperty<'a> {
    fn new(prop: &'a TemplateProperty) -> Result<Self, TemplateError> {
        let constraints = match &prop.constraints {
            Some(c) => serde_json::to_value(c).map_err(|e| TemplateError::Export(e.to_string()))?,
            None => Value::Object(Map::new()),
        };

        Ok(Self {
            name: &prop.name,
            datatype: prop.datatype.as_deref(),
            is_array: prop.is_array,
            is_object: prop.is_object,
            external_id: prop.external_id.as_deref(),
            json_path: prop.mappings.json_path.as_deref(),
            xml_path: prop.mappings.xml_path.as_deref(),
            fhir_mapping: prop.mappings.fhir_mapping.as_deref(),
            hl7v2_path: prop.mappings.hl7v2_path.as_deref(),
            dicom_path: prop.mappings.dicom_path.as_deref(),
            constraints,
        })
    }
}

impl<'a> JsonGroup<'a> {
    fn new(group: &'a TemplateGroup) -> Result<Self, TemplateError> {
        Ok(Self {
            name: &group.name,
            properties: group
                .properties
                .iter()
                .map(JsonProperty::new)
                .collect::<Result<_, _>>()?,
        })
    }
}

fn document(version: &TemplateVersion) -> Result<JsonTemplate<'_>, TemplateError> {
    Ok(JsonTemplate {
        version: &version.version,
        profile_id: &version.profile_id,
        groups: version
            .groups
            .iter()
            .map(JsonGroup::new)
            .collect::<Result<_, _>>()?,
    })
}

/// Structured view of `version`, shared by the JSON export and the
/// active-template endpoint.
pub fn to_json_value(version: &TemplateVersion) -> Result<Value, TemplateError> {
    serde_json::to_value(document(version)?).map_err(|e| TemplateError::Export(e.to_string()))
}

/// Render `version` as pretty-printed JSON, keys in declaration order.
pub fn to_json(version: &TemplateVersion) -> Result<String, TemplateError> {
    serde_json::to_string_pretty(&document(version)?)
        .map_err(|e| TemplateError::Export(e.to_string()))
}
