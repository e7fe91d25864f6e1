//! Property constraints and their `key:value;key:value` attribute syntax.
//!
//! ```text
//! constraints="allowed_values:BCC|SCC|Melanoma;required:true;unit:mm"
//!              └──────── list ────────────┘ └─ bool ─┘ └ raw ┘
//! ```
//!
//! `allowed_values` splits on `|`, `required` is a case-insensitive boolean,
//! and any other key is kept verbatim as a string.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Constraint key holding the list of accepted values.
pub const ALLOWED_VALUES_KEY: &str = "allowed_values";

/// Constraint key marking a property as mandatory.
pub const REQUIRED_KEY: &str = "required";

/// Open constraint mapping attached to a template property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,

    /// Unrecognized keys, preserved as raw strings
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Constraints {
    /// Parse the attribute micro-syntax.
    ///
    /// Returns `None` when no `key:value` pair survives parsing, so that an
    /// empty attribute never becomes an empty mapping.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut constraints = Constraints::default();

        for part in raw.split(';') {
            let Some((key, value)) = part.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }

            match key {
                ALLOWED_VALUES_KEY => {
                    let values = value
                        .split('|')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(String::from)
                        .collect();
                    constraints.allowed_values = Some(values);
                }
                REQUIRED_KEY => {
                    constraints.required = Some(value.eq_ignore_ascii_case("true"));
                }
                _ => {
                    constraints.extra.insert(key.to_string(), value.to_string());
                }
            }
        }

        if constraints.is_empty() {
            None
        } else {
            Some(constraints)
        }
    }

    /// True when no key is set.
    pub fn is_empty(&self) -> bool {
        self.required.is_none() && self.allowed_values.is_none() && self.extra.is_empty()
    }

    /// Whether the property must be present.
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    /// Render back to the attribute syntax, or `None` if nothing is set.
    pub fn to_attribute(&self) -> Option<String> {
        let rendered = self.to_string();
        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(values) = &self.allowed_values {
            parts.push(format!("{ALLOWED_VALUES_KEY}:{}", values.join("|")));
        }
        if let Some(required) = self.required {
            parts.push(format!("{REQUIRED_KEY}:{required}"));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{key}:{value}"));
        }

        f.write_str(&parts.join(";"))
    }
}
