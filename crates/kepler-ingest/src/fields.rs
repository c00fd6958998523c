//! Canonical field maps produced by the extractors

use serde::Serialize;
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// A single extracted value: scalar text or a set of distinct strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Set(BTreeSet<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            FieldValue::Set(values) => Some(values),
            FieldValue::Text(_) => None,
        }
    }
}

/// Field name to value, keyed by GeoBlacklight field names.
///
/// Names starting with an underscore (`_bbox_w`, `_marc_id`, ...) are
/// intermediate values consumed by [`GeoRecord::from_fields`] and never
/// written to the catalog directly.
///
/// [`GeoRecord::from_fields`]: crate::GeoRecord::from_fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MetadataFields(BTreeMap<String, FieldValue>);

impl MetadataFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar field, replacing any previous value.
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_string(), FieldValue::Text(value.into()));
    }

    /// Set a scalar field unless it already has a value.
    pub fn set_text_once(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_string())
            .or_insert_with(|| FieldValue::Text(value.into()));
    }

    /// Add a member to a set field, creating the set on first use.
    pub fn add_to_set(&mut self, name: &str, value: impl Into<String>) {
        let entry = self
            .0
            .entry(name.to_string())
            .or_insert_with(|| FieldValue::Set(BTreeSet::new()));
        match entry {
            FieldValue::Set(values) => {
                values.insert(value.into());
            },
            FieldValue::Text(_) => {
                tracing::debug!(field = name, "Ignoring set value for scalar field");
            },
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(FieldValue::as_text)
    }

    pub fn set(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name).and_then(FieldValue::as_set)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a MetadataFields {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
