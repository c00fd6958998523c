//! Streaming FGDC metadata extractor
//!
//! Walks the document as a flat stream of open/close events, keeping only
//! the stack of open element names and the text of the innermost element.
//! Keyword elements (`themekey`, `placekey`, `origin`, ...) accumulate into
//! sets; scalar elements keep their first occurrence, which for FGDC is the
//! one under `idinfo`.

use crate::error::{ExtractError, ExtractResult};
use crate::fields::MetadataFields;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;
use tracing::debug;

/// Extract canonical fields from an FGDC document.
pub fn extract<R: BufRead>(input: R) -> ExtractResult<MetadataFields> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut fields = MetadataFields::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|source| ExtractError::Xml {
                position: reader.buffer_position(),
                source,
            })?;

        match event {
            Event::Start(ref e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text.clear();
            },
            Event::Text(ref e) => {
                let unescaped = e.unescape().map_err(|source| ExtractError::Xml {
                    position: reader.buffer_position(),
                    source,
                })?;
                text.push_str(&unescaped);
            },
            Event::CData(ref e) => {
                text.push_str(&String::from_utf8_lossy(e));
            },
            Event::End(_) => {
                if let Some(name) = path.pop() {
                    let value = text.trim();
                    if !value.is_empty() {
                        handle_element(&mut fields, &path, &name, value);
                    }
                }
                text.clear();
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    if let Some(open) = path.pop() {
        return Err(ExtractError::Truncated(open));
    }

    debug!(fields = fields.len(), "Extracted FGDC metadata");
    Ok(fields)
}

/// Extract from an in-memory document.
pub fn extract_str(xml: &str) -> ExtractResult<MetadataFields> {
    extract(xml.as_bytes())
}

fn within(path: &[String], ancestor: &str) -> bool {
    path.iter().any(|p| p == ancestor)
}

fn handle_element(fields: &mut MetadataFields, path: &[String], name: &str, value: &str) {
    match name {
        "title" if within(path, "idinfo") => fields.set_text_once("dc_title_s", value),
        "origin" if within(path, "idinfo") => fields.add_to_set("dc_creator_sm", value),
        "publish" if within(path, "idinfo") => fields.set_text_once("dc_publisher_s", value),
        "abstract" => fields.set_text_once("dc_description_s", value),
        "westbc" => fields.set_text_once("_bbox_w", value),
        "eastbc" => fields.set_text_once("_bbox_e", value),
        "northbc" => fields.set_text_once("_bbox_n", value),
        "southbc" => fields.set_text_once("_bbox_s", value),
        "accconst" => fields.set_text_once("dc_rights_s", value),
        "themekey" => fields.add_to_set("dc_subject_sm", value),
        "placekey" => fields.add_to_set("dct_spatial_sm", value),
        "caldate" | "begdate" | "enddate" if within(path, "timeperd") => {
            fields.add_to_set("dct_temporal_sm", value)
        },
        "direct" if value.eq_ignore_ascii_case("raster") => {
            fields.set_text_once("layer_geom_type_s", "Raster")
        },
        "sdtstype" => fields.set_text_once("layer_geom_type_s", value),
        _ => {},
    }
}
