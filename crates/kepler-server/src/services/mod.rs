//! Remote service clients
//!
//! The engine talks to three remote systems through the traits below:
//! a hosting service that imports layers asynchronously, a preservation
//! archive, and a catalog index. Concrete clients are constructed once
//! from [`Config`](crate::config::Config) and injected into the engine.

pub mod geoserver;
pub mod solr;
pub mod sword;

pub use geoserver::GeoServerClient;
pub use solr::SolrClient;
pub use sword::{SwordClient, SwordPackage};

use async_trait::async_trait;
use kepler_common::AccessLevel;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::BasicAuth;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("Service not configured: {0}")]
    NotConfigured(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Package error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl ServiceError {
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    pub fn unexpected(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status of the failed call, if the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request { source, .. } => source.status(),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Turn a non-success response into [`ServiceError::Status`], keeping the
/// body for the job diagnostic.
pub(crate) async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> ServiceResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        url: url.to_string(),
        status,
        body,
    })
}

pub(crate) fn with_auth(
    request: reqwest::RequestBuilder,
    auth: Option<&BasicAuth>,
) -> reqwest::RequestBuilder {
    match auth {
        Some(auth) => request.basic_auth(&auth.username, auth.password.as_ref()),
        None => request,
    }
}

/// Normalise a service root so paths can be appended to it
pub(crate) fn base_url(root: &str) -> String {
    format!("{}/", root.trim_end_matches('/'))
}

// ============================================================================
// Hosting service
// ============================================================================

/// State of a remote import and its tasks, as reported by the hosting
/// service. Only `state` and the task list are interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportStatus {
    pub state: String,
    #[serde(default)]
    pub tasks: Vec<ImportTask>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportTask {
    #[serde(default)]
    pub href: Option<String>,
    pub state: String,
}

/// The kind of file an import carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Zipped shapefile, imported into the vector datastore
    Shapefile,
    GeoTiff,
}

impl UploadKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Shapefile => "application/zip",
            Self::GeoTiff => "image/tiff",
        }
    }
}

#[async_trait]
pub trait HostingService: Send + Sync {
    /// Workspace layers are published into
    fn workspace(&self) -> &str;

    fn wms_url(&self) -> String;

    fn wfs_url(&self) -> String;

    /// Create an import for `file`, upload it and start it. Returns the
    /// import URL to poll.
    async fn create_import(
        &self,
        file: &Path,
        kind: UploadKind,
        name: &str,
    ) -> ServiceResult<String>;

    async fn import_status(&self, import_url: &str) -> ServiceResult<ImportStatus>;

    async fn delete_import(&self, import_url: &str) -> ServiceResult<()>;

    async fn delete_task(&self, task_url: &str) -> ServiceResult<()>;
}

/// The public and restricted hosting instances
#[derive(Clone)]
pub struct HostingServices {
    pub public: Arc<dyn HostingService>,
    pub restricted: Arc<dyn HostingService>,
}

impl HostingServices {
    pub fn for_access(&self, access: AccessLevel) -> &Arc<dyn HostingService> {
        match access {
            AccessLevel::Public => &self.public,
            AccessLevel::Restricted => &self.restricted,
        }
    }
}

// ============================================================================
// Archive and catalog
// ============================================================================

#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// Deposit a packaged bundle. Returns the handle of the new resource.
    async fn submit(&self, package: &Path) -> ServiceResult<String>;

    /// URLs of the files the archive holds for `handle`
    async fn file_urls(&self, handle: &str) -> ServiceResult<Vec<String>>;
}

#[async_trait]
pub trait CatalogIndex: Send + Sync {
    /// Add or replace documents in the index
    async fn write(&self, documents: &[serde_json::Value]) -> ServiceResult<()>;
}

/// Every remote collaborator the engine needs
#[derive(Clone)]
pub struct Services {
    pub hosting: HostingServices,
    pub archive: Arc<dyn ArchiveService>,
    pub catalog: Arc<dyn CatalogIndex>,
}

impl Services {
    /// Build the HTTP clients from configuration
    pub fn from_config(config: &crate::config::Config) -> ServiceResult<Self> {
        let timeout = config.ingest.http_timeout();
        let geoserver = &config.geoserver;
        let public = GeoServerClient::new(
            &geoserver.public_url,
            &geoserver.workspace,
            &geoserver.datastore,
            geoserver.auth.clone(),
            timeout,
        )?;
        let restricted = GeoServerClient::new(
            &geoserver.restricted_url,
            &geoserver.workspace,
            &geoserver.datastore,
            geoserver.auth.clone(),
            timeout,
        )?;
        let archive = SwordClient::new(
            &config.sword.service_url,
            &config.sword.oai_ore_url,
            config.sword.auth.clone(),
            timeout,
        )?;
        let catalog = SolrClient::new(&config.solr.url, config.solr.auth.clone(), timeout)?;

        Ok(Self {
            hosting: HostingServices {
                public: Arc::new(public),
                restricted: Arc::new(restricted),
            },
            archive: Arc::new(archive),
            catalog: Arc::new(catalog),
        })
    }
}
