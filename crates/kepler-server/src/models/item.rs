//! Item: one submitted resource

use chrono::{DateTime, Utc};
use kepler_common::AccessLevel;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A distinct submitted resource, identified by its `uri`.
///
/// `handle` is written at most once; the archive submission step uses it
/// as its idempotency guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub uri: String,
    pub access: AccessLevel,
    /// `<workspace>:<layer name>` on the hosting service
    pub layer_id: Option<String>,
    pub handle: Option<String>,
    pub tiff_url: Option<String>,
    /// Serialized catalog document, published once the import completes
    pub record: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            uri: uri.into(),
            access: AccessLevel::default(),
            layer_id: None,
            handle: None,
            tiff_url: None,
            record: None,
            created_at: Utc::now(),
        }
    }
}
