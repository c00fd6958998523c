//! Kepler Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Metadata extraction for submitted geospatial and bibliographic packages.
//!
//! # Extractors
//!
//! - **FGDC**: geographic metadata documents shipped inside a bag
//! - **MARCXML**: bibliographic record collections, one canonical field set
//!   per `<record>`
//!
//! Both extractors stream over the document with `quick-xml`, so memory use
//! grows with element depth (and, for MARC, with a single record), never
//! with document size. Their output is a [`MetadataFields`] map keyed by
//! GeoBlacklight field names, which [`GeoRecord::from_fields`] turns into a
//! catalog record.
//!
//! # Example
//!
//! ```no_run
//! use kepler_ingest::{fgdc, GeoRecord};
//!
//! fn main() -> anyhow::Result<()> {
//!     let file = std::fs::File::open("fgdc.xml")?;
//!     let fields = fgdc::extract(std::io::BufReader::new(file))?;
//!     let record = GeoRecord::from_fields(&fields)?;
//!     println!("{}", record.to_document());
//!     Ok(())
//! }
//! ```

pub mod coordinates;
pub mod error;
pub mod fgdc;
pub mod fields;
pub mod identifiers;
pub mod marc;
pub mod mods;
pub mod record;

pub use coordinates::convert_coord;
pub use error::{ExtractError, ExtractResult};
pub use fields::{FieldValue, MetadataFields};
pub use identifiers::make_uuid;
pub use record::{GeoRecord, GeometryType, ResourceType};
