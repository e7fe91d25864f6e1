//! Report templates: import, validation, export and mapping edits.
//!
//! # Pipeline
//!
//! ```text
//!             ┌──────────────┐
//!  XML ──────▶│   importer   │──────▶ TemplateVersion (store)
//!             └──────────────┘               │
//!             ┌──────────────┐               │ active version
//!  XML ──────▶│  validator   │◀──────────────┤
//!             └──────┬───────┘               │
//!                    ▼                       ▼
//!             violations          ┌─────────────────────┐
//!                                 │ export: xml json hl7│
//!                                 └─────────────────────┘
//! ```
//!
//! Groups are matched at any depth in the document and properties are the
//! direct `Property` children of a group, both in document order. The
//! importer and validator share this traversal.

mod constraints;
pub mod export;
mod importer;
mod mappings;
mod model;
mod profiles;
mod validator;

pub use constraints::{Constraints, ALLOWED_VALUES_KEY, REQUIRED_KEY};
pub use importer::{import_template, ActivationPolicy, ImportOptions};
pub use mappings::{update_mappings, MappingUpdate};
pub use model::{
    PathMappings, Profile, TemplateGroup, TemplateProperty, TemplateVersion, DEFAULT_DATATYPE,
    DEFAULT_VERSION_LABEL,
};
pub use profiles::{active_version, create_profile, list_profiles};
pub use validator::validate_template;

/// Element name of a property group.
pub(crate) const GROUP_ELEMENT: &str = "Group";

/// Element name of a property.
pub(crate) const PROPERTY_ELEMENT: &str = "Property";

/// Every `Group` element at any depth, in document order.
pub(crate) fn group_elements<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    doc.descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == GROUP_ELEMENT)
}

/// Direct `Property` children of a group, in document order.
pub(crate) fn property_elements<'a, 'input>(
    group: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    group
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == PROPERTY_ELEMENT)
}

/// Parse a template document, mapping syntax errors to [`crate::error::TemplateError::Parse`].
pub(crate) fn parse_document(xml: &str) -> Result<roxmltree::Document<'_>, crate::error::TemplateError> {
    roxmltree::Document::parse(xml).map_err(|e| crate::error::TemplateError::Parse(e.to_string()))
}
