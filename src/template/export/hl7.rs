//! HL7v2-style segment rendering.
//!
//! ```text
//! hl7v2_path   "OBX-5-2"
//!               │   │ └─ component (1-based, 0 or absent = whole field)
//!               │   └─── field (1-based, default 1)
//!               └─────── segment
//!
//! A @ OBX-5-1, B @ OBX-5-2   ──▶   OBX|||||A^B
//! ```

use std::collections::BTreeMap;

use tracing::warn;

use crate::template::model::TemplateVersion;

pub const HL7_EXPORT_FILENAME: &str = "hl7_export.txt";

/// Largest field or component number accepted in a path.
pub const MAX_HL7_POSITION: usize = 999;

const FIELD_SEPARATOR: &str = "|";
const COMPONENT_SEPARATOR: &str = "^";

/// A parsed `SEGMENT[-FIELD[-COMPONENT]]` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Path {
    pub segment: String,
    pub field: usize,
    /// Zero addresses the whole field
    pub component: usize,
}

impl Hl7Path {
    /// Parse a path. Returns `None` for an empty segment, a non-numeric
    /// field or component, field zero, or a position above
    /// [`MAX_HL7_POSITION`].
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('-');

        let segment = parts.next()?.trim();
        if segment.is_empty() {
            return None;
        }
        let field = match parts.next() {
            Some(f) => f.trim().parse().ok()?,
            None => 1,
        };
        let component = match parts.next() {
            Some(c) => c.trim().parse().ok()?,
            None => 0,
        };
        if field == 0 || field > MAX_HL7_POSITION || component > MAX_HL7_POSITION {
            return None;
        }

        Some(Self {
            segment: segment.to_string(),
            field,
            component,
        })
    }
}

/// Segment name and its fields, keyed by 1-based field number.
type Segment = (String, BTreeMap<usize, Vec<String>>);

/// Render every property with an `hl7v2_path` as pipe-delimited segments.
///
/// Segments appear in first-seen order. A whole-field placement replaces the
/// field (last writer wins); a component placement pads the field with empty
/// components up to its index.
pub fn to_hl7(version: &TemplateVersion) -> String {
    let mut segments: Vec<Segment> = Vec::new();

    for (group, prop) in version.properties() {
        let Some(raw) = prop.mappings.hl7v2_path.as_deref() else {
            continue;
        };
        let Some(path) = Hl7Path::parse(raw) else {
            warn!(group, property = %prop.name, path = raw, "Skipping invalid HL7v2 path");
            continue;
        };

        let index = match segments.iter().position(|(name, _)| *name == path.segment) {
            Some(index) => index,
            None => {
                segments.push((path.segment.clone(), BTreeMap::new()));
                segments.len() - 1
            }
        };
        let field = segments[index].1.entry(path.field).or_default();

        if path.component == 0 {
            *field = vec![prop.name.clone()];
        } else {
            if field.len() < path.component {
                field.resize(path.component, String::new());
            }
            field[path.component - 1] = prop.name.clone();
        }
    }

    segments
        .iter()
        .map(|(name, fields)| render_segment(name, fields))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_segment(name: &str, fields: &BTreeMap<usize, Vec<String>>) -> String {
    let max_field = fields.keys().next_back().copied().unwrap_or(0);

    let mut line = name.to_string();
    for number in 1..=max_field {
        line.push_str(FIELD_SEPARATOR);
        if let Some(components) = fields.get(&number) {
            line.push_str(&components.join(COMPONENT_SEPARATOR));
        }
    }
    line
}
