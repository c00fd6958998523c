//! Package inspection
//!
//! A submission is a zipped BagIt bag: one top-level directory holding a
//! `data/` payload directory. MARC submissions may also be a bare MARCXML
//! file. Either way the payload is copied into a private temporary working
//! copy that the pipeline owns and removes when it is done.

use kepler_common::AccessLevel;
use kepler_ingest::record::rights_mapper;
use kepler_ingest::{fgdc, MetadataFields};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;
use tracing::debug;

use crate::error::{IngestError, IngestResult};

const DATA_DIR: &str = "data";
const FGDC_FILE: &str = "fgdc.xml";
const MARC_FILE: &str = "marc.xml";

/// Declared payload type of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Shapefile,
    GeoTiff,
    Marc,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shapefile => "shapefile",
            Self::GeoTiff => "geotiff",
            Self::Marc => "marc",
        }
    }

    /// Whether the job waits on a remote import after its steps finish
    pub fn awaits_import(&self) -> bool {
        matches!(self, Self::Shapefile | Self::GeoTiff)
    }

    /// Members the bag must carry
    fn required_members(&self) -> &'static [MemberRole] {
        match self {
            Self::Shapefile => &[MemberRole::Metadata, MemberRole::Shapefile],
            Self::GeoTiff => &[MemberRole::Metadata, MemberRole::GeoTiff],
            Self::Marc => &[MemberRole::Records],
        }
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shapefile" => Ok(Self::Shapefile),
            "geotiff" => Ok(Self::GeoTiff),
            "marc" => Ok(Self::Marc),
            _ => Err(IngestError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// A file a step needs from the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    /// FGDC metadata
    Metadata,
    /// Zipped shapefile
    Shapefile,
    GeoTiff,
    /// MARCXML records
    Records,
}

impl MemberRole {
    fn describe(&self) -> &'static str {
        match self {
            Self::Metadata => "FGDC metadata (fgdc.xml)",
            Self::Shapefile => "a shapefile (*.zip)",
            Self::GeoTiff => "a GeoTIFF (*.tif)",
            Self::Records => "MARC records (marc.xml)",
        }
    }

    fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        match self {
            Self::Metadata => lower == FGDC_FILE,
            Self::Shapefile => lower.ends_with(".zip"),
            Self::GeoTiff => lower.ends_with(".tif") || lower.ends_with(".tiff"),
            Self::Records => lower == MARC_FILE,
        }
    }
}

/// Private unpacked copy of a submission
#[derive(Debug)]
pub struct WorkingCopy {
    dir: TempDir,
    /// Bag root, the directory holding `data/`
    root: PathBuf,
}

impl WorkingCopy {
    /// Extract a zipped bag
    pub fn unpack(archive: &Path) -> IngestResult<Self> {
        let dir = tempfile::Builder::new().prefix("kepler-").tempdir()?;
        let mut zip = zip::ZipArchive::new(BufReader::new(File::open(archive)?))?;
        zip.extract(dir.path())?;

        let root = find_bag_root(dir.path())?;
        debug!(archive = %archive.display(), root = %root.display(), "Unpacked bag");
        Ok(Self { dir, root })
    }

    /// Copy a bare MARCXML file into a fresh working copy
    pub fn from_records(file: &Path) -> IngestResult<Self> {
        let dir = tempfile::Builder::new().prefix("kepler-").tempdir()?;
        let data = dir.path().join(DATA_DIR);
        fs::create_dir(&data)?;
        fs::copy(file, data.join(MARC_FILE))?;

        let root = dir.path().to_path_buf();
        Ok(Self { dir, root })
    }

    /// Path of the working directory; gone once the copy is closed
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate a payload member
    pub fn member(&self, role: MemberRole) -> IngestResult<PathBuf> {
        let data = self.root.join(DATA_DIR);
        let mut names: Vec<_> = fs::read_dir(&data)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        names
            .into_iter()
            .find(|name| role.matches(name))
            .map(|name| data.join(name))
            .ok_or_else(|| IngestError::MissingMember(role.describe().to_string()))
    }

    /// Layer name: the file stem of a member
    pub fn layer_name(&self, role: MemberRole) -> IngestResult<String> {
        let path = self.member(role)?;
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| IngestError::MissingMember(role.describe().to_string()))
    }

    /// Fields of the bag's FGDC document
    pub fn metadata(&self) -> IngestResult<MetadataFields> {
        read_metadata(&self.member(MemberRole::Metadata)?)
    }

    /// Remove the working directory
    pub fn close(self) -> IngestResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = %path.display(), "Removed working copy");
        Ok(())
    }
}

/// Extract canonical fields from an FGDC document
pub fn read_metadata(path: &Path) -> IngestResult<MetadataFields> {
    Ok(fgdc::extract(BufReader::new(File::open(path)?))?)
}

fn has_data_dir(dir: &Path) -> bool {
    dir.join(DATA_DIR).is_dir()
}

fn find_bag_root(extracted: &Path) -> IngestResult<PathBuf> {
    if has_data_dir(extracted) {
        return Ok(extracted.to_path_buf());
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(extracted)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && has_data_dir(path))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| IngestError::MissingMember("a data/ directory".to_string()))
}

/// Access level declared by FGDC metadata
pub fn access_level(fields: &MetadataFields) -> IngestResult<AccessLevel> {
    match fields.text("dc_rights_s").map(str::trim) {
        None | Some("") => Ok(AccessLevel::Public),
        Some(term) => {
            rights_mapper(term).map_err(|_| IngestError::InvalidAccessLevel(term.to_string()))
        },
    }
}

/// A classified submission with its working copy
#[derive(Debug)]
pub struct Submission {
    pub payload: PayloadType,
    pub access: AccessLevel,
    pub copy: WorkingCopy,
}

/// Unpack `archive` and check it against the declared payload type.
///
/// The working copy is removed again if classification fails.
pub fn inspect(archive: &Path, payload: PayloadType) -> IngestResult<Submission> {
    let copy = match payload {
        PayloadType::Marc if !is_zip(archive) => WorkingCopy::from_records(archive)?,
        _ => WorkingCopy::unpack(archive)?,
    };

    match classify(&copy, payload) {
        Ok(access) => Ok(Submission {
            payload,
            access,
            copy,
        }),
        Err(e) => {
            if let Err(cleanup) = copy.close() {
                tracing::warn!(error = %cleanup, "Failed to remove working copy");
            }
            Err(e)
        },
    }
}

fn classify(copy: &WorkingCopy, payload: PayloadType) -> IngestResult<AccessLevel> {
    for role in payload.required_members() {
        copy.member(*role)?;
    }
    match payload {
        PayloadType::Marc => Ok(AccessLevel::Public),
        _ => access_level(&copy.metadata()?),
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const FGDC: &str = r#"<metadata><idinfo><citation><citeinfo>
        <title>Roads</title></citeinfo></citation>
        <accconst>{ACCESS}</accconst></idinfo></metadata>"#;

    fn bag(dir: &Path, members: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("bag.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, content) in members {
            zip.start_file(format!("roads/data/{}", name), SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content).unwrap();
        }
        zip.start_file("roads/bagit.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"BagIt-Version: 0.97\n").unwrap();
        zip.finish().unwrap();
        path
    }

    fn fgdc(access: &str) -> Vec<u8> {
        FGDC.replace("{ACCESS}", access).into_bytes()
    }

    #[test]
    fn test_payload_type_from_str() {
        assert_eq!("Shapefile".parse::<PayloadType>().unwrap(), PayloadType::Shapefile);
        assert_eq!("geotiff".parse::<PayloadType>().unwrap(), PayloadType::GeoTiff);
        assert!(matches!(
            "warez".parse::<PayloadType>(),
            Err(IngestError::UnsupportedFormat(t)) if t == "warez"
        ));
    }

    #[test]
    fn test_inspect_shapefile_bag() {
        let tmp = tempfile::tempdir().unwrap();
        let fgdc = fgdc("Restricted Access Online");
        let archive = bag(tmp.path(), &[("fgdc.xml", &fgdc), ("roads.zip", b"PK")]);

        let submission = inspect(&archive, PayloadType::Shapefile).unwrap();
        assert_eq!(submission.access, AccessLevel::Restricted);
        assert!(submission.copy.root().ends_with("roads"));
        assert_eq!(submission.copy.layer_name(MemberRole::Shapefile).unwrap(), "roads");

        let path = submission.copy.path().to_path_buf();
        submission.copy.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_access_defaults_to_public() {
        let tmp = tempfile::tempdir().unwrap();
        let fgdc = fgdc("");
        let archive = bag(tmp.path(), &[("fgdc.xml", &fgdc), ("scan.tif", b"II*\0")]);
        let submission = inspect(&archive, PayloadType::GeoTiff).unwrap();
        assert_eq!(submission.access, AccessLevel::Public);
    }

    #[test]
    fn test_invalid_access_level() {
        let tmp = tempfile::tempdir().unwrap();
        let fgdc = fgdc("Members only");
        let archive = bag(tmp.path(), &[("fgdc.xml", &fgdc), ("roads.zip", b"PK")]);
        assert!(matches!(
            inspect(&archive, PayloadType::Shapefile),
            Err(IngestError::InvalidAccessLevel(_))
        ));
    }

    #[test]
    fn test_missing_member() {
        let tmp = tempfile::tempdir().unwrap();
        let fgdc = fgdc("Unrestricted Access Online");
        let archive = bag(tmp.path(), &[("fgdc.xml", &fgdc)]);
        let err = inspect(&archive, PayloadType::Shapefile).unwrap_err();
        assert_eq!(err.to_string(), "Package is missing a shapefile (*.zip)");
    }

    #[test]
    fn test_bare_marc_file() {
        let tmp = tempfile::tempdir().unwrap();
        let records = tmp.path().join("records.xml");
        std::fs::write(&records, "<collection/>").unwrap();

        let submission = inspect(&records, PayloadType::Marc).unwrap();
        assert_eq!(submission.access, AccessLevel::Public);
        let member = submission.copy.member(MemberRole::Records).unwrap();
        assert!(member.ends_with("data/marc.xml"));
    }
}
