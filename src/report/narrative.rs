use std::collections::HashMap;

use serde::Serialize;

/// Property name feeding [`Narrative::macroscopy`].
pub const MACROSCOPY_PROPERTY: &str = "Macroscopy";
/// Property name feeding [`Narrative::microscopy`].
pub const MICROSCOPY_PROPERTY: &str = "Microscopy";
/// Property name feeding [`Narrative::clinical_details`].
pub const CLINICAL_DETAILS_PROPERTY: &str = "ClinicalDetails";
/// Property name feeding [`Narrative::diagnosis`].
pub const DIAGNOSIS_PROPERTY: &str = "Diagnosis";

/// The four free-text fields shown next to a slide in the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Narrative {
    pub macroscopy: String,
    pub microscopy: String,
    #[serde(rename = "clinicalDetails")]
    pub clinical_details: String,
    pub diagnosis: String,
}

impl Default for Narrative {
    fn default() -> Self {
        Self {
            macroscopy: "Placeholder macroscopy data".to_string(),
            microscopy: "Placeholder microscopy data".to_string(),
            clinical_details: "Placeholder clinical details".to_string(),
            diagnosis: "Placeholder diagnosis".to_string(),
        }
    }
}

impl Narrative {
    /// Replace placeholders with report values keyed by property name.
    /// Fields without a matching value keep their current text.
    pub fn overlay(&mut self, values: &HashMap<String, String>) {
        let fields = [
            (MACROSCOPY_PROPERTY, &mut self.macroscopy),
            (MICROSCOPY_PROPERTY, &mut self.microscopy),
            (CLINICAL_DETAILS_PROPERTY, &mut self.clinical_details),
            (DIAGNOSIS_PROPERTY, &mut self.diagnosis),
        ];
        for (property, field) in fields {
            if let Some(value) = values.get(property) {
                *field = value.clone();
            }
        }
    }
}
