//! GeoServer Importer client
//!
//! Uploads go through the Importer REST extension, which processes them
//! asynchronously: an import is created, the file is attached as a task,
//! the import is started, and its state is polled until it settles.

use async_trait::async_trait;
use reqwest::{Body, Client};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::{
    base_url, check_status, with_auth, HostingService, ImportStatus, ServiceError,
    ServiceResult, UploadKind,
};
use crate::config::BasicAuth;

#[derive(Debug, Deserialize)]
struct ImportEnvelope<T> {
    import: T,
}

#[derive(Debug, Deserialize)]
struct CreatedImport {
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
}

/// One GeoServer instance and the workspace layers are published into.
#[derive(Debug, Clone)]
pub struct GeoServerClient {
    client: Client,
    base: String,
    workspace: String,
    datastore: String,
    auth: Option<BasicAuth>,
}

impl GeoServerClient {
    pub fn new(
        root_url: &str,
        workspace: &str,
        datastore: &str,
        auth: Option<BasicAuth>,
        timeout: Duration,
    ) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::request(root_url, e))?;

        Ok(Self {
            client,
            base: if root_url.is_empty() { String::new() } else { base_url(root_url) },
            workspace: workspace.to_string(),
            datastore: datastore.to_string(),
            auth,
        })
    }

    fn imports_url(&self) -> ServiceResult<String> {
        if self.base.is_empty() {
            return Err(ServiceError::NotConfigured("geoserver"));
        }
        Ok(format!("{}rest/imports", self.base))
    }

    fn import_body(&self, kind: UploadKind) -> serde_json::Value {
        let workspace = json!({ "workspace": { "name": self.workspace } });
        match kind {
            UploadKind::Shapefile => json!({
                "import": {
                    "targetWorkspace": workspace,
                    "targetStore": { "dataStore": { "name": self.datastore } },
                }
            }),
            UploadKind::GeoTiff => json!({
                "import": { "targetWorkspace": workspace }
            }),
        }
    }

    async fn new_import(&self, kind: UploadKind) -> ServiceResult<String> {
        let url = self.imports_url()?;
        let response = with_auth(self.client.post(&url), self.auth.as_ref())
            .json(&self.import_body(kind))
            .send()
            .await
            .map_err(|e| ServiceError::request(&url, e))?;
        let response = check_status(&url, response).await?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let created: Option<ImportEnvelope<CreatedImport>> = response.json().await.ok();

        let href = created.and_then(|c| {
            c.import.href.or_else(|| {
                c.import.id.map(|id| match id {
                    serde_json::Value::String(s) => format!("{}/{}", url, s),
                    other => format!("{}/{}", url, other),
                })
            })
        });

        href.or(location)
            .ok_or_else(|| ServiceError::unexpected(&url, "import created without an href"))
    }

    async fn upload_task(
        &self,
        import_url: &str,
        file: &Path,
        kind: UploadKind,
        filename: &str,
    ) -> ServiceResult<()> {
        let url = format!("{}/tasks/{}", import_url.trim_end_matches('/'), filename);
        let handle = tokio::fs::File::open(file).await?;
        let length = handle.metadata().await?.len();

        let response = with_auth(self.client.put(&url), self.auth.as_ref())
            .header(reqwest::header::CONTENT_TYPE, kind.content_type())
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(handle)))
            .send()
            .await
            .map_err(|e| ServiceError::request(&url, e))?;
        check_status(&url, response).await?;

        debug!(url = %url, bytes = length, "Uploaded import task");
        Ok(())
    }

    async fn start_import(&self, import_url: &str) -> ServiceResult<()> {
        let response = with_auth(self.client.post(import_url), self.auth.as_ref())
            .send()
            .await
            .map_err(|e| ServiceError::request(import_url, e))?;
        check_status(import_url, response).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> ServiceResult<()> {
        let response = with_auth(self.client.delete(url), self.auth.as_ref())
            .send()
            .await
            .map_err(|e| ServiceError::request(url, e))?;
        check_status(url, response).await?;
        Ok(())
    }
}

#[async_trait]
impl HostingService for GeoServerClient {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn wms_url(&self) -> String {
        format!("{}wms", self.base)
    }

    fn wfs_url(&self) -> String {
        format!("{}wfs", self.base)
    }

    async fn create_import(
        &self,
        file: &Path,
        kind: UploadKind,
        name: &str,
    ) -> ServiceResult<String> {
        let extension = match kind {
            UploadKind::Shapefile => "zip",
            UploadKind::GeoTiff => "tif",
        };
        let filename = format!("{}.{}", name, extension);

        let import_url = self.new_import(kind).await?;
        let started = match self.upload_task(&import_url, file, kind, &filename).await {
            Ok(()) => self.start_import(&import_url).await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            // The import was never handed to a job, so remove it here
            if let Err(cleanup) = self.delete(&import_url).await {
                warn!(import_url = %import_url, error = %cleanup, "Could not delete abandoned import");
            }
            return Err(e);
        }

        info!(import_url = %import_url, layer = name, "Started GeoServer import");
        Ok(import_url)
    }

    async fn import_status(&self, import_url: &str) -> ServiceResult<ImportStatus> {
        let response = with_auth(self.client.get(import_url), self.auth.as_ref())
            .send()
            .await
            .map_err(|e| ServiceError::request(import_url, e))?;
        let response = check_status(import_url, response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::request(import_url, e))?;

        serde_json::from_str::<ImportEnvelope<ImportStatus>>(&body)
            .map(|envelope| envelope.import)
            .map_err(|e| ServiceError::unexpected(import_url, e.to_string()))
    }

    async fn delete_import(&self, import_url: &str) -> ServiceResult<()> {
        self.delete(import_url).await
    }

    async fn delete_task(&self, task_url: &str) -> ServiceResult<()> {
        self.delete(task_url).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn client(root: &str) -> GeoServerClient {
        GeoServerClient::new(root, "mit", "data", None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_service_urls() {
        let gs = client("http://geo.example.com/geoserver");
        assert_eq!(gs.wms_url(), "http://geo.example.com/geoserver/wms");
        assert_eq!(gs.wfs_url(), "http://geo.example.com/geoserver/wfs");
        assert_eq!(gs.imports_url().unwrap(), "http://geo.example.com/geoserver/rest/imports");
    }

    #[test]
    fn test_shapefile_import_targets_datastore() {
        let body = client("http://geo").import_body(UploadKind::Shapefile);
        assert_eq!(body["import"]["targetWorkspace"]["workspace"]["name"], "mit");
        assert_eq!(body["import"]["targetStore"]["dataStore"]["name"], "data");

        let body = client("http://geo").import_body(UploadKind::GeoTiff);
        assert!(body["import"].get("targetStore").is_none());
    }

    #[test]
    fn test_unconfigured_instance() {
        let gs = client("");
        assert!(matches!(gs.imports_url(), Err(ServiceError::NotConfigured(_))));
    }
}
