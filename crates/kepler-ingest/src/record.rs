//! GeoBlacklight catalog record
//!
//! [`GeoRecord`] holds the typed fields of one catalog document. It is
//! built from extracted [`MetadataFields`], adjusted by the caller (layer
//! id, references, format), and serialized with [`GeoRecord::to_document`].

use crate::error::{ExtractError, ExtractResult};
use crate::fields::MetadataFields;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use kepler_common::AccessLevel;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use uuid::Uuid;

/// Reference keys used in `dct_references_s`
pub mod references {
    pub const WMS: &str = "http://www.opengis.net/def/serviceType/ogc/wms";
    pub const WFS: &str = "http://www.opengis.net/def/serviceType/ogc/wfs";
    pub const DOWNLOAD: &str = "http://schema.org/downloadUrl";
}

const SLUG_PREFIX: &str = "mit-";

/// Geometry vocabulary accepted by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
    Raster,
    ScannedMap,
    PaperMap,
    Mixed,
}

impl GeometryType {
    const ALL: [GeometryType; 7] = [
        GeometryType::Point,
        GeometryType::Line,
        GeometryType::Polygon,
        GeometryType::Raster,
        GeometryType::ScannedMap,
        GeometryType::PaperMap,
        GeometryType::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::Line => "Line",
            GeometryType::Polygon => "Polygon",
            GeometryType::Raster => "Raster",
            GeometryType::ScannedMap => "Scanned Map",
            GeometryType::PaperMap => "Paper Map",
            GeometryType::Mixed => "Mixed",
        }
    }
}

impl FromStr for GeometryType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ExtractError::invalid("layer_geom_type_s", s))
    }
}

/// Resource type vocabulary accepted by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Dataset,
    Image,
    PhysicalObject,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Dataset => "Dataset",
            ResourceType::Image => "Image",
            ResourceType::PhysicalObject => "PhysicalObject",
        }
    }
}

/// Map an FGDC access constraint onto the catalog's rights vocabulary.
///
/// "Unrestricted ..." is Public and "Restricted ..." is Restricted; any
/// other term must already be one of the two.
pub fn rights_mapper(term: &str) -> ExtractResult<AccessLevel> {
    let lower = term.trim().to_lowercase();
    if lower.starts_with("unrestricted") {
        Ok(AccessLevel::Public)
    } else if lower.starts_with("restricted") {
        Ok(AccessLevel::Restricted)
    } else {
        term.parse()
            .map_err(|_| ExtractError::invalid("dc_rights_s", term))
    }
}

/// Map an FGDC spatial object type onto the catalog's geometry vocabulary.
pub fn geometry_mapper(term: &str) -> ExtractResult<GeometryType> {
    let lower = term.to_lowercase();
    if lower.contains("point") {
        Ok(GeometryType::Point)
    } else if lower.contains("string") {
        Ok(GeometryType::Line)
    } else if lower.contains("polygon") || lower.contains("chain") {
        Ok(GeometryType::Polygon)
    } else {
        term.parse()
    }
}

/// A GeoBlacklight record
#[derive(Debug, Clone)]
pub struct GeoRecord {
    pub uuid: Option<String>,
    pub dc_identifier_s: Option<String>,
    pub dc_title_s: Option<String>,
    pub dc_description_s: Option<String>,
    pub dc_rights_s: Option<AccessLevel>,
    pub dct_provenance_s: Option<String>,
    pub dct_references_s: BTreeMap<String, String>,
    pub layer_id_s: Option<String>,
    pub layer_geom_type_s: Option<GeometryType>,
    pub layer_modified_dt: DateTime<Utc>,
    /// Explicit slug; derived from `uuid` when unset
    pub layer_slug_s: Option<String>,
    pub solr_year_i: Option<i32>,
    pub dc_creator_sm: BTreeSet<String>,
    pub dc_format_s: Option<String>,
    pub dc_language_s: Option<String>,
    pub dc_publisher_s: Option<String>,
    pub dc_subject_sm: BTreeSet<String>,
    pub dc_type_s: Option<ResourceType>,
    pub dct_spatial_sm: BTreeSet<String>,
    pub dct_temporal_sm: BTreeSet<String>,
    pub dct_issued_dt: Option<String>,
    pub dct_is_part_of_sm: BTreeSet<String>,
    pub bbox_w: Option<BigDecimal>,
    pub bbox_e: Option<BigDecimal>,
    pub bbox_n: Option<BigDecimal>,
    pub bbox_s: Option<BigDecimal>,
    pub lat: Option<BigDecimal>,
    pub lon: Option<BigDecimal>,
}

impl Default for GeoRecord {
    fn default() -> Self {
        Self {
            uuid: None,
            dc_identifier_s: None,
            dc_title_s: None,
            dc_description_s: None,
            dc_rights_s: None,
            dct_provenance_s: None,
            dct_references_s: BTreeMap::new(),
            layer_id_s: None,
            layer_geom_type_s: None,
            layer_modified_dt: Utc::now(),
            layer_slug_s: None,
            solr_year_i: None,
            dc_creator_sm: BTreeSet::new(),
            dc_format_s: None,
            dc_language_s: None,
            dc_publisher_s: None,
            dc_subject_sm: BTreeSet::new(),
            dc_type_s: None,
            dct_spatial_sm: BTreeSet::new(),
            dct_temporal_sm: BTreeSet::new(),
            dct_issued_dt: None,
            dct_is_part_of_sm: BTreeSet::new(),
            bbox_w: None,
            bbox_e: None,
            bbox_n: None,
            bbox_s: None,
            lat: None,
            lon: None,
        }
    }
}

fn decimal(fields: &MetadataFields, name: &str) -> ExtractResult<Option<BigDecimal>> {
    fields
        .text(name)
        .map(|v| BigDecimal::from_str(v.trim()).map_err(|_| ExtractError::invalid(name, v)))
        .transpose()
}

fn owned(fields: &MetadataFields, name: &str) -> Option<String> {
    fields.text(name).map(str::to_string)
}

fn set(fields: &MetadataFields, name: &str) -> BTreeSet<String> {
    fields.set(name).cloned().unwrap_or_default()
}

impl GeoRecord {
    /// Build a record from extracted fields, applying the rights and
    /// geometry mappers. Unknown field names are ignored.
    pub fn from_fields(fields: &MetadataFields) -> ExtractResult<Self> {
        let solr_year_i = fields
            .text("solr_year_i")
            .map(|v| v.trim().parse().map_err(|_| ExtractError::invalid("solr_year_i", v)))
            .transpose()?;

        Ok(Self {
            uuid: owned(fields, "uuid"),
            dc_identifier_s: owned(fields, "dc_identifier_s"),
            dc_title_s: owned(fields, "dc_title_s"),
            dc_description_s: owned(fields, "dc_description_s"),
            dc_rights_s: fields.text("dc_rights_s").map(rights_mapper).transpose()?,
            dct_provenance_s: owned(fields, "dct_provenance_s"),
            layer_id_s: owned(fields, "layer_id_s"),
            layer_geom_type_s: fields
                .text("layer_geom_type_s")
                .map(geometry_mapper)
                .transpose()?,
            layer_slug_s: owned(fields, "layer_slug_s"),
            solr_year_i,
            dc_creator_sm: set(fields, "dc_creator_sm"),
            dc_format_s: owned(fields, "dc_format_s"),
            dc_language_s: owned(fields, "dc_language_s"),
            dc_publisher_s: owned(fields, "dc_publisher_s"),
            dc_subject_sm: set(fields, "dc_subject_sm"),
            dct_spatial_sm: set(fields, "dct_spatial_sm"),
            dct_temporal_sm: set(fields, "dct_temporal_sm"),
            dct_issued_dt: owned(fields, "dct_issued_dt"),
            bbox_w: decimal(fields, "_bbox_w")?,
            bbox_e: decimal(fields, "_bbox_e")?,
            bbox_n: decimal(fields, "_bbox_n")?,
            bbox_s: decimal(fields, "_bbox_s")?,
            lat: decimal(fields, "_lat")?,
            lon: decimal(fields, "_lon")?,
            ..Self::default()
        })
    }

    /// Add references, replacing existing entries with the same key.
    pub fn merge_references<I, K, V>(&mut self, references: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.dct_references_s
            .extend(references.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    /// `mit-` plus the URL-safe base64 of the first eight UUID bytes
    pub fn layer_slug(&self) -> Option<String> {
        if let Some(slug) = &self.layer_slug_s {
            return Some(slug.clone());
        }
        let uuid = Uuid::parse_str(self.uuid.as_deref()?).ok()?;
        Some(format!("{}{}", SLUG_PREFIX, URL_SAFE_NO_PAD.encode(&uuid.as_bytes()[..8])))
    }

    fn bounds(&self) -> Option<[&BigDecimal; 4]> {
        Some([
            self.bbox_w.as_ref()?,
            self.bbox_e.as_ref()?,
            self.bbox_n.as_ref()?,
            self.bbox_s.as_ref()?,
        ])
    }

    /// `"S W N E"`
    pub fn georss_box_s(&self) -> Option<String> {
        let [w, e, n, s] = self.bounds()?;
        Some(format!("{} {} {} {}", s, w, n, e))
    }

    /// `"W S E N"`
    pub fn solr_bbox(&self) -> Option<String> {
        let [w, e, n, s] = self.bounds()?;
        Some(format!("{} {} {} {}", w, s, e, n))
    }

    /// `"ENVELOPE(W, E, N, S)"`
    pub fn solr_geom(&self) -> Option<String> {
        let [w, e, n, s] = self.bounds()?;
        Some(format!("ENVELOPE({}, {}, {}, {})", w, e, n, s))
    }

    /// `"LAT LON"`
    pub fn georss_point_s(&self) -> Option<String> {
        Some(format!("{} {}", self.lat.as_ref()?, self.lon.as_ref()?))
    }

    /// The catalog document. Unset fields and empty sets are omitted.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();

        let mut text = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                doc.insert(key.to_string(), Value::String(value));
            }
        };
        text("uuid", self.uuid.clone());
        text("dc_identifier_s", self.dc_identifier_s.clone());
        text("dc_title_s", self.dc_title_s.clone());
        text("dc_description_s", self.dc_description_s.clone());
        text("dc_rights_s", self.dc_rights_s.map(|r| r.as_str().to_string()));
        text("dct_provenance_s", self.dct_provenance_s.clone());
        text("georss_box_s", self.georss_box_s());
        text("layer_id_s", self.layer_id_s.clone());
        text("layer_geom_type_s", self.layer_geom_type_s.map(|g| g.as_str().to_string()));
        text(
            "layer_modified_dt",
            Some(self.layer_modified_dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        text("layer_slug_s", self.layer_slug());
        text("solr_bbox", self.solr_bbox());
        text("solr_geom", self.solr_geom());
        text("dc_format_s", self.dc_format_s.clone());
        text("dc_language_s", self.dc_language_s.clone());
        text("dc_publisher_s", self.dc_publisher_s.clone());
        text("dc_type_s", self.dc_type_s.map(|t| t.as_str().to_string()));
        text("dct_issued_dt", self.dct_issued_dt.clone());
        text("georss_point_s", self.georss_point_s());
        if !self.dct_references_s.is_empty() {
            text("dct_references_s", Some(json!(self.dct_references_s).to_string()));
        }

        if let Some(year) = self.solr_year_i {
            doc.insert("solr_year_i".to_string(), json!(year));
        }

        for (key, values) in [
            ("dc_creator_sm", &self.dc_creator_sm),
            ("dc_subject_sm", &self.dc_subject_sm),
            ("dct_spatial_sm", &self.dct_spatial_sm),
            ("dct_temporal_sm", &self.dct_temporal_sm),
            ("dct_isPartOf_sm", &self.dct_is_part_of_sm),
        ] {
            if !values.is_empty() {
                doc.insert(key.to_string(), json!(values));
            }
        }

        Value::Object(doc)
    }

    /// Serialized document, as stored on an item before publication
    pub fn to_json(&self) -> String {
        self.to_document().to_string()
    }
}
