//! Projections of an active template version into downloadable documents.
//!
//! Each projection is a pure function of a [`TemplateVersion`]; the store is
//! read once by [`export_template`] and never written.

mod hl7;
mod json;
mod xml;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::TemplateError;
use crate::store::Database;

use super::model::TemplateVersion;
use super::profiles::active_version;

pub use hl7::{to_hl7, Hl7Path, HL7_EXPORT_FILENAME};
pub use json::{to_json, to_json_value, JSON_EXPORT_FILENAME};
pub use xml::to_xml;

/// Target format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xml,
    Json,
    Hl7v2,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xml => "application/xml",
            ExportFormat::Json => "application/json",
            ExportFormat::Hl7v2 => "text/plain",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Xml => "xml",
            ExportFormat::Json => "json",
            ExportFormat::Hl7v2 => "hl7v2",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(ExportFormat::Xml),
            "json" => Ok(ExportFormat::Json),
            "hl7" | "hl7v2" => Ok(ExportFormat::Hl7v2),
            other => Err(TemplateError::Invalid(format!(
                "Unknown export format: {other}"
            ))),
        }
    }
}

/// A rendered export, ready to be served as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

impl ExportFile {
    /// `Content-Disposition` header value for this file.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Render `version` in `format`.
pub fn render(version: &TemplateVersion, format: ExportFormat) -> Result<ExportFile, TemplateError> {
    let (filename, body) = match format {
        ExportFormat::Xml => (
            format!("template_export_{}.xml", version.version),
            to_xml(version)?,
        ),
        ExportFormat::Json => (JSON_EXPORT_FILENAME.to_string(), to_json(version)?),
        ExportFormat::Hl7v2 => (HL7_EXPORT_FILENAME.to_string(), to_hl7(version)),
    };

    Ok(ExportFile {
        filename,
        content_type: format.content_type(),
        body,
    })
}

/// Export the active template version of `profile_id`.
pub fn export_template(
    db: &Database,
    profile_id: &str,
    format: ExportFormat,
) -> Result<ExportFile, TemplateError> {
    let version = active_version(db, profile_id)?;
    let file = render(&version, format)?;

    debug!(
        profile_id,
        version = %version.version,
        %format,
        bytes = file.body.len(),
        "Exported template"
    );
    Ok(file)
}
