use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::TemplateError;
use crate::template::model::{TemplateProperty, TemplateVersion};
use crate::template::{GROUP_ELEMENT, PROPERTY_ELEMENT};

const ROOT_ELEMENT: &str = "Template";

/// Render `version` as an indented `<Template>` document.
///
/// Attributes are written only for fields that are set, so re-importing the
/// output yields the same properties.
pub fn to_xml(version: &TemplateVersion) -> Result<String, TemplateError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;

    for group in &version.groups {
        let mut start = BytesStart::new(GROUP_ELEMENT);
        start.push_attribute(("name", group.name.as_str()));

        if group.properties.is_empty() {
            write(&mut writer, Event::Empty(start))?;
            continue;
        }

        write(&mut writer, Event::Start(start))?;
        for prop in &group.properties {
            write(&mut writer, Event::Empty(property_element(prop)))?;
        }
        write(&mut writer, Event::End(BytesEnd::new(GROUP_ELEMENT)))?;
    }

    write(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| TemplateError::Export(e.to_string()))
}

fn property_element(prop: &TemplateProperty) -> BytesStart<'_> {
    let mut el = BytesStart::new(PROPERTY_ELEMENT);
    el.push_attribute(("name", prop.name.as_str()));
    el.push_attribute(("type", prop.datatype_or_default()));

    let optional = [
        ("id", &prop.external_id),
        ("jsonPath", &prop.mappings.json_path),
        ("xmlPath", &prop.mappings.xml_path),
        ("fhirMapping", &prop.mappings.fhir_mapping),
        ("hl7v2Path", &prop.mappings.hl7v2_path),
        ("dicomPath", &prop.mappings.dicom_path),
    ];
    for (attr, value) in optional {
        if let Some(value) = value {
            el.push_attribute((attr, value.as_str()));
        }
    }

    if prop.is_array {
        el.push_attribute(("array", "true"));
    }
    if prop.is_object {
        el.push_attribute(("object", "true"));
    }
    if let Some(constraints) = prop.constraints.as_ref().and_then(|c| c.to_attribute()) {
        el.push_attribute(("constraints", constraints.as_str()));
    }
    el
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), TemplateError> {
    writer
        .write_event(event)
        .map_err(|e| TemplateError::Export(e.to_string()))
}
