//! Pipeline steps
//!
//! Each payload type runs a fixed, ordered list of [`Step`]s. Steps commit
//! their side effects to the ledger as they go, so progress made before a
//! later step fails survives.

use kepler_common::AccessLevel;
use kepler_ingest::record::references;
use kepler_ingest::{make_uuid, marc, mods, ExtractError, GeoRecord, MetadataFields, ResourceType};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::blocking;
use crate::bag::{self, MemberRole, PayloadType, WorkingCopy};
use crate::error::{IngestError, IngestResult};
use crate::ledger::JobLedger;
use crate::models::{Item, Job};
use crate::services::{HostingService, Services, SwordPackage, UploadKind};

/// Catalog documents sent per index request when loading MARC records
pub const MARC_BATCH_SIZE: usize = 500;

const SWORD_PACKAGE: &str = "sword.zip";

/// Everything a step may read or update
pub struct StepContext<'a> {
    pub ledger: &'a dyn JobLedger,
    pub services: &'a Services,
    pub uuid_namespace: &'a str,
    pub job: &'a mut Job,
    pub item_id: Uuid,
    pub access: AccessLevel,
    pub copy: &'a WorkingCopy,
}

impl StepContext<'_> {
    /// Current state of the item; earlier steps may have changed it
    async fn item(&self) -> IngestResult<Item> {
        Ok(self.ledger.get_item(self.item_id).await?)
    }

    fn hosting(&self) -> &Arc<dyn HostingService> {
        self.services.hosting.for_access(self.access)
    }

    /// FGDC metadata of the submission
    async fn metadata(&self) -> IngestResult<MetadataFields> {
        let path = self.copy.member(MemberRole::Metadata)?;
        blocking(move || bag::read_metadata(&path)).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    UploadShapefile,
    IndexShapefile,
    SubmitToArchive,
    ResolveDownloadUrl,
    UploadGeoTiff,
    IndexGeoTiff,
    IndexMarcRecords,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UploadShapefile => "upload-shapefile",
            Self::IndexShapefile => "index-shapefile",
            Self::SubmitToArchive => "submit-to-archive",
            Self::ResolveDownloadUrl => "resolve-download-url",
            Self::UploadGeoTiff => "upload-geotiff",
            Self::IndexGeoTiff => "index-geotiff",
            Self::IndexMarcRecords => "index-marc-records",
        }
    }

    /// Ordered steps for a payload type
    pub fn for_payload(payload: PayloadType) -> &'static [Step] {
        match payload {
            PayloadType::Shapefile => &[Step::UploadShapefile, Step::IndexShapefile],
            PayloadType::GeoTiff => &[
                Step::SubmitToArchive,
                Step::ResolveDownloadUrl,
                Step::UploadGeoTiff,
                Step::IndexGeoTiff,
            ],
            PayloadType::Marc => &[Step::IndexMarcRecords],
        }
    }

    pub async fn run(&self, ctx: &mut StepContext<'_>) -> IngestResult<()> {
        debug!(step = self.name(), job_id = %ctx.job.id, "Running step");
        match self {
            Self::UploadShapefile => upload(ctx, UploadKind::Shapefile).await,
            Self::IndexShapefile => index_layer(ctx, UploadKind::Shapefile).await,
            Self::SubmitToArchive => submit_to_archive(ctx).await,
            Self::ResolveDownloadUrl => resolve_download_url(ctx).await,
            Self::UploadGeoTiff => upload(ctx, UploadKind::GeoTiff).await,
            Self::IndexGeoTiff => index_layer(ctx, UploadKind::GeoTiff).await,
            Self::IndexMarcRecords => index_marc_records(ctx).await,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn member_role(kind: UploadKind) -> MemberRole {
    match kind {
        UploadKind::Shapefile => MemberRole::Shapefile,
        UploadKind::GeoTiff => MemberRole::GeoTiff,
    }
}

/// Start a hosting-service import and record its URL on the job
async fn upload(ctx: &mut StepContext<'_>, kind: UploadKind) -> IngestResult<()> {
    let role = member_role(kind);
    let file = ctx.copy.member(role)?;
    let name = ctx.copy.layer_name(role)?;

    let import_url = ctx.hosting().create_import(&file, kind, &name).await?;
    ctx.job.import_url = Some(import_url);
    ctx.ledger.update_job(ctx.job).await?;

    info!(
        job_id = %ctx.job.id,
        access = %ctx.access,
        import_url = ctx.job.import_url.as_deref().unwrap_or_default(),
        "Upload accepted by hosting service"
    );
    Ok(())
}

/// Build the layer's catalog record and store it on the item. It is
/// published once the import completes.
async fn index_layer(ctx: &mut StepContext<'_>, kind: UploadKind) -> IngestResult<()> {
    let item = ctx.item().await?;
    let hosting = ctx.hosting();
    let name = ctx.copy.layer_name(member_role(kind))?;
    let layer_id = format!("{}:{}", hosting.workspace(), name);
    ctx.ledger.set_item_layer_id(item.id, &layer_id).await?;

    let uuid = Uuid::parse_str(&item.uri).map_err(|_| IngestError::InvalidUri(item.uri.clone()))?;
    let mut record = GeoRecord::from_fields(&ctx.metadata().await?)?;
    record.uuid = Some(item.uri.clone());
    record.dc_identifier_s = Some(uuid.urn().to_string());
    record.dc_type_s = Some(ResourceType::Dataset);
    record.layer_id_s = Some(layer_id);

    match kind {
        UploadKind::Shapefile => {
            record.dc_format_s = Some("Shapefile".to_string());
            record.merge_references([
                (references::WMS, hosting.wms_url()),
                (references::WFS, hosting.wfs_url()),
            ]);
        },
        UploadKind::GeoTiff => {
            let tiff_url = item.tiff_url.clone().ok_or_else(|| IngestError::MissingItemField {
                uri: item.uri.clone(),
                field: "tiff_url",
            })?;
            record.dc_format_s = Some("GeoTIFF".to_string());
            record.merge_references([
                (references::WMS, hosting.wms_url()),
                (references::DOWNLOAD, tiff_url),
            ]);
        },
    }

    ctx.ledger.set_item_record(item.id, &record.to_json()).await?;
    debug!(item = %item.uri, "Stored catalog record");
    Ok(())
}

/// Deposit the GeoTIFF in the archive. Skipped once the item has a handle.
async fn submit_to_archive(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let item = ctx.item().await?;
    if let Some(handle) = &item.handle {
        info!(item = %item.uri, handle = %handle, "Item already archived, skipping deposit");
        return Ok(());
    }

    let tiff = ctx.copy.member(MemberRole::GeoTiff)?;
    let mods = mods::mods_from_fgdc(&ctx.metadata().await?);
    let package_path = ctx.copy.path().join(SWORD_PACKAGE);
    SwordPackage {
        uuid: &item.uri,
        mods: &mods,
        datafile: &tiff,
    }
    .write(&package_path)?;

    let handle = ctx.services.archive.submit(&package_path).await?;
    let stored = ctx.ledger.set_item_handle(item.id, &handle).await?;
    info!(item = %item.uri, handle = %stored, "Deposited item in archive");
    Ok(())
}

/// Look up the archived GeoTIFF's public URL
async fn resolve_download_url(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let item = ctx.item().await?;
    let handle = item.handle.as_deref().ok_or_else(|| IngestError::MissingItemField {
        uri: item.uri.clone(),
        field: "handle",
    })?;

    let urls = ctx.services.archive.file_urls(handle).await?;
    let [tiff_url] = urls.as_slice() else {
        return Err(IngestError::ArchiveContents(format!(
            "Expected 1 tiff, found {}",
            urls.len()
        )));
    };

    ctx.ledger.set_item_tiff_url(item.id, tiff_url).await?;
    debug!(item = %item.uri, tiff_url = %tiff_url, "Resolved download URL");
    Ok(())
}

/// Index every record of a MARCXML file directly. Records are parsed on
/// a blocking thread and handed over in batches.
async fn index_marc_records(ctx: &mut StepContext<'_>) -> IngestResult<()> {
    let file = ctx.copy.member(MemberRole::Records)?;
    let namespace = ctx.uuid_namespace.to_string();
    let (tx, mut rx) = mpsc::channel(2);
    let reader = tokio::task::spawn_blocking(move || read_marc_batches(&file, &namespace, &tx));

    let mut total = 0usize;
    while let Some(batch) = rx.recv().await {
        let batch = batch?;
        ctx.services.catalog.write(&batch).await?;
        total += batch.len();
    }
    reader
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e)))?;

    info!(job_id = %ctx.job.id, records = total, "Indexed MARC records");
    Ok(())
}

type MarcBatch = IngestResult<Vec<Value>>;

fn read_marc_batches(file: &Path, namespace: &str, tx: &mpsc::Sender<MarcBatch>) {
    if let Err(e) = send_marc_batches(file, namespace, tx) {
        let _ = tx.blocking_send(Err(e));
    }
}

/// Stops quietly once the receiver is gone
fn send_marc_batches(file: &Path, namespace: &str, tx: &mpsc::Sender<MarcBatch>) -> IngestResult<()> {
    let mut batch = Vec::with_capacity(MARC_BATCH_SIZE);
    for fields in marc::records(BufReader::new(File::open(file)?)) {
        let fields = fields?;
        let marc_id = fields
            .text("_marc_id")
            .ok_or_else(|| ExtractError::invalid("_marc_id", ""))?;
        let mut record = GeoRecord::from_fields(&fields)?;
        record.uuid = Some(make_uuid(marc_id, namespace).to_string());
        batch.push(record.to_document());

        if batch.len() == MARC_BATCH_SIZE {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(MARC_BATCH_SIZE));
            if tx.blocking_send(Ok(full)).is_err() {
                return Ok(());
            }
        }
    }
    if !batch.is_empty() {
        let _ = tx.blocking_send(Ok(batch));
    }
    Ok(())
}
