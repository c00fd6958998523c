//! Solr catalog index client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

use super::{base_url, check_status, with_auth, CatalogIndex, ServiceError, ServiceResult};
use crate::config::BasicAuth;

#[derive(Debug, Clone)]
pub struct SolrClient {
    client: Client,
    base: String,
    auth: Option<BasicAuth>,
}

impl SolrClient {
    pub fn new(url: &str, auth: Option<BasicAuth>, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::request(url, e))?;

        Ok(Self {
            client,
            base: if url.is_empty() { String::new() } else { base_url(url) },
            auth,
        })
    }

    fn update_url(&self) -> ServiceResult<String> {
        if self.base.is_empty() {
            return Err(ServiceError::NotConfigured("solr"));
        }
        Ok(format!("{}update?commit=true", self.base))
    }
}

#[async_trait]
impl CatalogIndex for SolrClient {
    async fn write(&self, documents: &[serde_json::Value]) -> ServiceResult<()> {
        let url = self.update_url()?;
        let response = with_auth(self.client.post(&url), self.auth.as_ref())
            .json(documents)
            .send()
            .await
            .map_err(|e| ServiceError::request(&url, e))?;
        check_status(&url, response).await?;

        info!(count = documents.len(), "Indexed catalog documents");
        Ok(())
    }
}
