//! XML template importer.
//!
//! The whole import is one SQLite transaction. The document is parsed before
//! the store is touched; a failure while walking groups and properties drops
//! the transaction, so no version, group or property from the call survives.

use std::time::{Duration, Instant};

use roxmltree::Node;
use tracing::{debug, info, warn};

use crate::error::TemplateError;
use crate::store::{self, Database};

use super::constraints::Constraints;
use super::model::{
    PathMappings, TemplateGroup, TemplateProperty, TemplateVersion, DEFAULT_DATATYPE,
    DEFAULT_VERSION_LABEL,
};
use super::{group_elements, parse_document, property_elements};

/// Group name used when a `Group` element has no `name` attribute.
pub const UNNAMED_GROUP: &str = "UnnamedGroup";

/// What happens to a profile's existing active versions on import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivationPolicy {
    /// Leave earlier versions flagged active. Readers pick the newest active one.
    #[default]
    KeepExisting,
    /// Clear the active flag on earlier versions inside the import transaction.
    DeactivatePrevious,
}

/// Options for [`import_template`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Version label; defaults to `"v1"`
    pub version_label: Option<String>,
    pub activation: ActivationPolicy,
    /// Abort and roll back once the import has run this long
    pub timeout: Option<Duration>,
}

impl ImportOptions {
    pub fn with_version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = Some(label.into());
        self
    }

    pub fn with_activation(mut self, activation: ActivationPolicy) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Import `xml` as a new active template version of `profile_id`.
pub fn import_template(
    db: &Database,
    xml: &str,
    profile_id: &str,
    options: &ImportOptions,
) -> Result<TemplateVersion, TemplateError> {
    let started = Instant::now();
    let doc = parse_document(xml).inspect_err(|e| warn!(profile_id, "{}", e))?;

    let label = options
        .version_label
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(DEFAULT_VERSION_LABEL);

    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        if store::profiles::get_profile(&tx, profile_id)?.is_none() {
            return Err(TemplateError::NotFound(format!(
                "Profile not found: {profile_id}"
            )));
        }

        if options.activation == ActivationPolicy::DeactivatePrevious {
            let cleared = store::templates::deactivate_versions(&tx, profile_id)?;
            debug!(profile_id, cleared, "Deactivated previous versions");
        }

        let created_at = store::now_timestamp();
        let version_id =
            store::templates::insert_version(&tx, profile_id, label, true, &created_at)?;

        let mut version = TemplateVersion {
            id: version_id,
            profile_id: profile_id.to_string(),
            version: label.to_string(),
            active: true,
            created_at,
            groups: Vec::new(),
        };

        for (group_pos, group_el) in group_elements(&doc).enumerate() {
            let name = group_el.attribute("name").unwrap_or(UNNAMED_GROUP);
            let group_id = store::templates::insert_group(&tx, version_id, group_pos, name)?;

            let mut group = TemplateGroup {
                id: group_id,
                name: name.to_string(),
                properties: Vec::new(),
            };

            for (prop_pos, prop_el) in property_elements(group_el).enumerate() {
                let mut prop = read_property(prop_el, name)?;
                prop.id = store::templates::insert_property(&tx, group_id, prop_pos, &prop)?;
                group.properties.push(prop);
            }

            debug!(
                group = name,
                properties = group.properties.len(),
                "Added template group"
            );
            version.groups.push(group);

            check_deadline(started, options.timeout)?;
        }

        check_deadline(started, options.timeout)?;
        tx.commit()?;

        info!(
            profile_id,
            version = %version.version,
            version_id,
            groups = version.groups.len(),
            properties = version.property_count(),
            "Imported template"
        );
        Ok(version)
    })
    .inspect_err(|e| warn!(profile_id, "Template import rolled back: {}", e))
}

/// Read one `Property` element.
fn read_property(el: Node, group: &str) -> Result<TemplateProperty, TemplateError> {
    let name = el
        .attribute("name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            TemplateError::Invalid(format!(
                "Group '{group}' has a property with no name."
            ))
        })?;

    let flag = |attr: &str| {
        el.attribute(attr)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
    let text = |attr: &str| el.attribute(attr).map(String::from);

    Ok(TemplateProperty {
        id: 0,
        name: name.to_string(),
        datatype: Some(el.attribute("type").unwrap_or(DEFAULT_DATATYPE).to_string()),
        is_array: flag("array"),
        is_object: flag("object"),
        external_id: text("id"),
        mappings: PathMappings {
            json_path: text("jsonPath"),
            xml_path: text("xmlPath"),
            fhir_mapping: text("fhirMapping"),
            hl7v2_path: text("hl7v2Path"),
            dicom_path: text("dicomPath"),
        },
        constraints: el.attribute("constraints").and_then(Constraints::parse),
    })
}

fn check_deadline(started: Instant, timeout: Option<Duration>) -> Result<(), TemplateError> {
    match timeout {
        Some(limit) if started.elapsed() >= limit => Err(TemplateError::Timeout {
            seconds: limit.as_secs(),
        }),
        _ => Ok(()),
    }
}
