//! MODS rendering for archival packages

use crate::fields::MetadataFields;
use quick_xml::escape::escape;
use std::fmt::Write;

const MODS_NS: &str = "http://www.loc.gov/mods/v3";

/// Render a MODS document from FGDC-derived fields.
///
/// Only descriptive fields are carried over; bounding box values become a
/// `cartographics/coordinates` string in `W E N S` order.
pub fn mods_from_fgdc(fields: &MetadataFields) -> String {
    let mut body = String::new();

    if let Some(title) = fields.text("dc_title_s") {
        element(&mut body, 1, "titleInfo", &format!("<mods:title>{}</mods:title>", escape(title)));
    }
    if let Some(creators) = fields.set("dc_creator_sm") {
        for creator in creators {
            element(
                &mut body,
                1,
                "name",
                &format!("<mods:namePart>{}</mods:namePart>", escape(creator.as_str())),
            );
        }
    }
    if let Some(publisher) = fields.text("dc_publisher_s") {
        element(
            &mut body,
            1,
            "originInfo",
            &format!("<mods:publisher>{}</mods:publisher>", escape(publisher)),
        );
    }
    if let Some(description) = fields.text("dc_description_s") {
        element(&mut body, 1, "abstract", &escape(description));
    }
    if let Some(rights) = fields.text("dc_rights_s") {
        element(&mut body, 1, "accessCondition", &escape(rights));
    }
    for (name, child) in [("dc_subject_sm", "topic"), ("dct_spatial_sm", "geographic"), ("dct_temporal_sm", "temporal")] {
        for value in fields.set(name).into_iter().flatten() {
            element(
                &mut body,
                1,
                "subject",
                &format!("<mods:{0}>{1}</mods:{0}>", child, escape(value.as_str())),
            );
        }
    }
    let corners: Option<Vec<&str>> = ["_bbox_w", "_bbox_e", "_bbox_n", "_bbox_s"]
        .iter()
        .map(|name| fields.text(name))
        .collect();
    if let Some(corners) = corners {
        element(
            &mut body,
            1,
            "subject",
            &format!(
                "<mods:cartographics><mods:coordinates>{}</mods:coordinates></mods:cartographics>",
                escape(corners.join(" ").as_str())
            ),
        );
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<mods:mods xmlns:mods=\"{}\" version=\"3.5\">\n{}</mods:mods>\n",
        MODS_NS, body
    )
}

fn element(out: &mut String, depth: usize, name: &str, content: &str) {
    // writing to a String never fails
    let _ = writeln!(out, "{}<mods:{name}>{content}</mods:{name}>", "  ".repeat(depth));
}
