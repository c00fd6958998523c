//! SWORD deposit client and package builder
//!
//! GeoTIFFs are preserved in a DSpace repository. A deposit is a zip
//! holding a METS document (with the MODS description embedded) and the
//! data file. The repository answers with an Atom entry whose `<id>` is the
//! handle of the new item; its files are later listed through OAI-ORE.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Body, Client};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::{check_status, with_auth, ArchiveService, ServiceError, ServiceResult};
use crate::config::BasicAuth;

const HANDLE_PREFIX: &str = "http://hdl.handle.net/";
const METS_PACKAGING: &str = "http://purl.org/net/sword-types/METSDSpaceSIP";

/// Headers for a SWORD v1 deposit of `filename`
pub fn sword_headers(filename: &str) -> [(&'static str, String); 4] {
    [
        ("Content-Type", "application/zip".to_string()),
        ("Content-Disposition", format!("filename={}", filename)),
        ("X-No-Op", "false".to_string()),
        ("X-Packaging", METS_PACKAGING.to_string()),
    ]
}

/// A deposit bundle: one data file described by a MODS record
#[derive(Debug, Clone)]
pub struct SwordPackage<'a> {
    pub uuid: &'a str,
    /// MODS document; an XML declaration is dropped when embedding
    pub mods: &'a str,
    pub datafile: &'a Path,
}

impl SwordPackage<'_> {
    fn datafile_name(&self) -> ServiceResult<String> {
        self.datafile
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("data file has no name: {}", self.datafile.display()),
                ))
            })
    }

    /// METS wrapper for the package
    pub fn mets(&self) -> ServiceResult<String> {
        let filename = self.datafile_name()?;
        let created = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(create_mets(self.uuid, &filename, self.mods, &created))
    }

    /// Write the zip to `dest`
    pub fn write(&self, dest: &Path) -> ServiceResult<()> {
        let filename = self.datafile_name()?;
        let mets = self.mets()?;

        let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
        let options = SimpleFileOptions::default();

        zip.start_file("mets.xml", options)?;
        zip.write_all(mets.as_bytes())?;

        zip.start_file(filename.as_str(), options)?;
        let mut data = File::open(self.datafile)?;
        std::io::copy(&mut data, &mut zip)?;

        zip.finish()?.flush()?;
        debug!(package = %dest.display(), "Wrote SWORD package");
        Ok(())
    }
}

fn strip_declaration(xml: &str) -> &str {
    let trimmed = xml.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

fn create_mets(uuid: &str, filename: &str, mods: &str, created: &str) -> String {
    let uuid = escape(uuid);
    let filename = escape(filename);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mets xmlns="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink"
      ID="sword-mets" OBJID="sword-mets" LABEL="DSpace SWORD Item" PROFILE="DSpace METS SIP Profile 1.0">
  <metsHdr CREATEDATE="{created}">
    <agent ROLE="CUSTODIAN" TYPE="ORGANIZATION">
      <name>Kepler</name>
    </agent>
  </metsHdr>
  <dmdSec ID="sword-mets-dmd-1" GROUPID="sword-mets-dmd-1_group-1">
    <mdWrap MDTYPE="MODS">
      <xmlData>
{mods}
      </xmlData>
    </mdWrap>
  </dmdSec>
  <fileSec>
    <fileGrp ID="sword-mets-fgrp-1" USE="CONTENT">
      <file GROUPID="sword-mets-fgid-0" ID="{uuid}" MIMETYPE="image/tiff">
        <FLocat LOCTYPE="URL" xlink:href="{filename}"/>
      </file>
    </fileGrp>
  </fileSec>
  <structMap ID="sword-mets-struct-1" LABEL="structure" TYPE="LOGICAL">
    <div ID="sword-mets-div-1" DMDID="sword-mets-dmd-1" TYPE="SWORD Object">
      <div ID="sword-mets-div-2" TYPE="File">
        <fptr FILEID="{uuid}"/>
      </div>
    </div>
  </structMap>
</mets>
"#,
        created = created,
        mods = strip_declaration(mods),
        uuid = uuid,
        filename = filename,
    )
}

/// Text of the first Atom `<id>` in a deposit receipt
pub fn parse_handle(receipt: &str) -> ServiceResult<Option<String>> {
    let mut reader = Reader::from_str(receipt);
    reader.config_mut().trim_text(true);
    let mut in_id = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"id" => in_id = true,
            Event::Text(t) if in_id => {
                let handle = t.unescape()?.trim().to_string();
                return Ok((!handle.is_empty()).then_some(handle));
            },
            Event::End(_) => in_id = false,
            Event::Eof => return Ok(None),
            _ => {},
        }
    }
}

/// `rdf:about` values of `rdf:Description` elements that name a TIFF
pub fn parse_tiff_urls(ore: &str) -> ServiceResult<Vec<String>> {
    let mut reader = Reader::from_str(ore);
    reader.config_mut().trim_text(true);
    let mut urls = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Description" => {
                let about = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"about");
                if let Some(attr) = about {
                    let value = attr.unescape_value()?.into_owned();
                    if value.contains(".tif") {
                        urls.push(value);
                    }
                }
            },
            Event::Eof => return Ok(urls),
            _ => {},
        }
    }
}

/// DSpace SWORD service plus its OAI-ORE endpoint.
#[derive(Debug, Clone)]
pub struct SwordClient {
    client: Client,
    service_url: String,
    ore_url: String,
    auth: Option<BasicAuth>,
}

impl SwordClient {
    pub fn new(
        service_url: &str,
        ore_url: &str,
        auth: Option<BasicAuth>,
        timeout: Duration,
    ) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::request(service_url, e))?;

        Ok(Self {
            client,
            service_url: service_url.to_string(),
            ore_url: ore_url.to_string(),
            auth,
        })
    }

    fn ore_map_url(&self, handle: &str) -> ServiceResult<String> {
        if self.ore_url.is_empty() {
            return Err(ServiceError::NotConfigured("oai-ore"));
        }
        let handle = handle.strip_prefix(HANDLE_PREFIX).unwrap_or(handle);
        Ok(format!("{}{}/ore.xml", self.ore_url, handle))
    }
}

#[async_trait]
impl ArchiveService for SwordClient {
    async fn submit(&self, package: &Path) -> ServiceResult<String> {
        if self.service_url.is_empty() {
            return Err(ServiceError::NotConfigured("sword"));
        }
        let url = self.service_url.as_str();
        let filename = package
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("package.zip");

        let file = tokio::fs::File::open(package).await?;
        let length = file.metadata().await?.len();

        let mut request = with_auth(self.client.post(url), self.auth.as_ref())
            .header(reqwest::header::CONTENT_LENGTH, length);
        for (name, value) in sword_headers(filename) {
            request = request.header(name, value);
        }
        let response = request
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| ServiceError::request(url, e))?;
        let response = check_status(url, response).await?;
        let receipt = response
            .text()
            .await
            .map_err(|e| ServiceError::request(url, e))?;

        let handle = parse_handle(&receipt)?
            .ok_or_else(|| ServiceError::unexpected(url, "deposit receipt has no Atom id"))?;
        info!(handle = %handle, "Deposited package");
        Ok(handle)
    }

    async fn file_urls(&self, handle: &str) -> ServiceResult<Vec<String>> {
        let url = self.ore_map_url(handle)?;
        let response = with_auth(self.client.get(&url), self.auth.as_ref())
            .send()
            .await
            .map_err(|e| ServiceError::request(&url, e))?;
        let response = check_status(&url, response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::request(&url, e))?;
        parse_tiff_urls(&body)
    }
}
