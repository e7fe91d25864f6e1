//! Template tree: Profile → TemplateVersion → TemplateGroup → TemplateProperty.

use serde::{Deserialize, Serialize};

use super::constraints::Constraints;

/// Datatype assumed when a property declares none.
pub const DEFAULT_DATATYPE: &str = "string";

/// Version label used when an import does not name one.
pub const DEFAULT_VERSION_LABEL: &str = "v1";

/// An organizational profile owning template versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// One imported version of a profile's template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateVersion {
    pub id: i64,
    pub profile_id: String,
    pub version: String,
    pub active: bool,
    pub created_at: String,
    pub groups: Vec<TemplateGroup>,
}

impl TemplateVersion {
    /// Iterate over every property together with the name of its group.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &TemplateProperty)> {
        self.groups.iter().flat_map(|group| {
            group
                .properties
                .iter()
                .map(move |prop| (group.name.as_str(), prop))
        })
    }

    /// Number of properties across all groups.
    pub fn property_count(&self) -> usize {
        self.groups.iter().map(|g| g.properties.len()).sum()
    }
}

/// A named group of properties within a version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateGroup {
    pub id: i64,
    pub name: String,
    pub properties: Vec<TemplateProperty>,
}

/// Format-specific addresses of a property. Each is independent and optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMappings {
    pub json_path: Option<String>,
    pub xml_path: Option<String>,
    pub fhir_mapping: Option<String>,
    pub hl7v2_path: Option<String>,
    pub dicom_path: Option<String>,
}

/// A typed field of a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateProperty {
    /// Row id; zero until persisted
    pub id: i64,
    pub name: String,
    pub datatype: Option<String>,
    pub is_array: bool,
    pub is_object: bool,
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub mappings: PathMappings,
    pub constraints: Option<Constraints>,
}

impl TemplateProperty {
    /// Datatype tag, falling back to [`DEFAULT_DATATYPE`].
    pub fn datatype_or_default(&self) -> &str {
        self.datatype.as_deref().unwrap_or(DEFAULT_DATATYPE)
    }
}
