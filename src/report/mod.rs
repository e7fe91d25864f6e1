//! Diagnostic reports and their typed property values.
//!
//! A report collects values against one template's properties for one
//! subject (a slide, block, specimen or case). Both edges leaving a report
//! are weak:
//!
//! - [`LinkedObject`] names the subject by kind and id. The subject table
//!   is not a foreign key, so the subject may be missing.
//! - [`PropertyRef`] names a template property by id. The property may sit
//!   in a superseded version, or may have been deleted with its version.
//!
//! Resolution of either returns `Option`; a dangling reference is a normal
//! outcome, not an error.

mod narrative;
mod service;

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::slide::SlideRecord;

pub use narrative::{
    Narrative, CLINICAL_DETAILS_PROPERTY, DIAGNOSIS_PROPERTY, MACROSCOPY_PROPERTY,
    MICROSCOPY_PROPERTY,
};
pub use service::{create_slide_report, narrative_for_slide, slide_report_values, NewSlideReport};

// =============================================================================
// Report Type
// =============================================================================

/// Kind of subject a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Slide,
    Block,
    Specimen,
    Case,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Slide => "SLIDE",
            ReportType::Block => "BLOCK",
            ReportType::Specimen => "SPECIMEN",
            ReportType::Case => "CASE",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SLIDE" => Ok(ReportType::Slide),
            "BLOCK" => Ok(ReportType::Block),
            "SPECIMEN" => Ok(ReportType::Specimen),
            "CASE" => Ok(ReportType::Case),
            other => Err(format!("unknown report type '{other}'")),
        }
    }
}

// =============================================================================
// Property Value
// =============================================================================

/// A single report value. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl PropertyValue {
    /// Storage tag written to `value_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Bool(_) => "bool",
        }
    }

    /// Interpret `raw` according to a template datatype tag.
    ///
    /// Unknown tags fall back to a string value. Returns `None` when `raw`
    /// does not parse as the declared numeric or boolean type.
    pub fn coerce(datatype: &str, raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        match datatype.to_ascii_lowercase().as_str() {
            "int" | "integer" => trimmed.parse().ok().map(PropertyValue::Int),
            "float" | "double" | "decimal" | "number" => {
                trimmed.parse().ok().map(PropertyValue::Float)
            }
            "bool" | "boolean" => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(PropertyValue::Bool(true)),
                "false" | "no" | "0" => Some(PropertyValue::Bool(false)),
                _ => None,
            },
            _ => Some(PropertyValue::String(raw.to_string())),
        }
    }

    /// Rebuild a value from its `(value_kind, value_text)` columns.
    pub fn from_storage(kind: &str, text: &str) -> Result<Self, StoreError> {
        let corrupt = || StoreError::Corrupt(format!("value '{text}' is not a valid {kind}"));
        match kind {
            "string" => Ok(PropertyValue::String(text.to_string())),
            "int" => text.parse().map(PropertyValue::Int).map_err(|_| corrupt()),
            "float" => text.parse().map(PropertyValue::Float).map_err(|_| corrupt()),
            "bool" => text.parse().map(PropertyValue::Bool).map_err(|_| corrupt()),
            other => Err(StoreError::Corrupt(format!("unknown value kind '{other}'"))),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

// =============================================================================
// Weak References
// =============================================================================

/// Weak reference from a report to its subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedObject {
    pub kind: ReportType,
    pub id: String,
}

impl LinkedObject {
    pub fn slide(id: impl Into<String>) -> Self {
        Self {
            kind: ReportType::Slide,
            id: id.into(),
        }
    }

    /// Resolve to a slide record. `None` if this is not a slide reference
    /// or the slide no longer exists.
    pub fn resolve_slide(&self, conn: &Connection) -> Result<Option<SlideRecord>, StoreError> {
        if self.kind != ReportType::Slide {
            return Ok(None);
        }
        crate::store::slides::get_slide(conn, &self.id)
    }
}

/// Weak reference from a report value to a template property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyRef {
    pub property_id: i64,
}

impl PropertyRef {
    pub fn new(property_id: i64) -> Self {
        Self { property_id }
    }

    /// Name of the referenced property, or `None` if it is gone.
    pub fn resolve_name(&self, conn: &Connection) -> Result<Option<String>, StoreError> {
        let name = conn
            .query_row(
                "SELECT name FROM template_properties WHERE id = ?1",
                params![self.property_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }
}

// =============================================================================
// Report
// =============================================================================

/// One stored value of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportValue {
    pub property: PropertyRef,
    pub value: PropertyValue,
}

/// A report with its values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: String,
    pub linked_object: LinkedObject,
    pub report_text: Option<String>,
    pub created_at: String,
    pub values: Vec<ReportValue>,
}
