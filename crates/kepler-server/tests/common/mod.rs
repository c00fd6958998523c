//! Shared fixtures for ingest engine integration tests
//!
//! Every remote service is a `wiremock` server; the ledger is the
//! in-memory implementation.

#![allow(dead_code)]

use kepler_server::ingest::IngestService;
use kepler_server::ledger::{JobLedger, MemoryLedger};
use kepler_server::services::{
    GeoServerClient, HostingServices, Services, SolrClient, SwordClient,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use wiremock::MockServer;
use zip::write::SimpleFileOptions;

pub const NAMESPACE: &str = "arrowsmith.mit.edu";
pub const ITEM_URI: &str = "c8921f5a-eac7-509b-bac5-bd1b2cb202dc";
pub const HANDLE: &str = "http://hdl.handle.net/1721.1/12345";

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("kepler_server=debug")
            .with_test_writer()
            .try_init();
    });
}

/// Minimal FGDC document with the given access constraint and geometry
pub fn fgdc(access: &str, geometry: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <idinfo>
    <citation><citeinfo>
      <origin>MIT GIS Services</origin>
      <title>Roads of Cambridge</title>
    </citeinfo></citation>
    <descript><abstract>Road centerlines.</abstract></descript>
    <spdom><bounding>
      <westbc>-71.16</westbc><eastbc>-71.06</eastbc>
      <northbc>42.40</northbc><southbc>42.35</southbc>
    </bounding></spdom>
    <keywords><theme><themekey>transportation</themekey></theme></keywords>
    <accconst>{access}</accconst>
  </idinfo>
  <spdoinfo><ptvctinf><sdtsterm><sdtstype>{geometry}</sdtstype></sdtsterm></ptvctinf></spdoinfo>
</metadata>"#
    )
}

/// Write a zipped bag named `<dir>/<bag>.zip` whose `data/` holds `members`
pub fn write_bag(dir: &Path, bag: &str, members: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(format!("{}.zip", bag));
    let mut zip = zip::ZipWriter::new(File::create(&path).expect("create bag"));
    let options = SimpleFileOptions::default();
    zip.start_file(format!("{}/bagit.txt", bag), options).expect("bagit.txt");
    zip.write_all(b"BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n")
        .expect("write bagit.txt");
    for (name, content) in members {
        zip.start_file(format!("{}/data/{}", bag, name), options).expect("member");
        zip.write_all(content).expect("write member");
    }
    zip.finish().expect("finish bag");
    path
}

pub fn shapefile_bag(dir: &Path, access: &str, geometry: &str) -> PathBuf {
    let fgdc = fgdc(access, geometry);
    write_bag(dir, "roads", &[("fgdc.xml", fgdc.as_bytes()), ("roads.zip", b"PK\x03\x04shp")])
}

pub fn geotiff_bag(dir: &Path, access: &str) -> PathBuf {
    let fgdc = fgdc(access, "Raster");
    write_bag(dir, "scan", &[("fgdc.xml", fgdc.as_bytes()), ("scan.tif", b"II*\0tiff")])
}

/// Mock remote services wired into an engine over an in-memory ledger
pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub service: IngestService,
    pub public: MockServer,
    pub restricted: MockServer,
    pub solr: MockServer,
    pub sword: MockServer,
}

impl Harness {
    pub async fn start() -> Self {
        init_tracing();

        let public = MockServer::start().await;
        let restricted = MockServer::start().await;
        let solr = MockServer::start().await;
        let sword = MockServer::start().await;

        let timeout = Duration::from_secs(5);
        let geoserver = |root: &str| {
            GeoServerClient::new(root, "mit", "data", None, timeout).expect("geoserver client")
        };
        let services = Services {
            hosting: HostingServices {
                public: Arc::new(geoserver(&public.uri())),
                restricted: Arc::new(geoserver(&restricted.uri())),
            },
            archive: Arc::new(
                SwordClient::new(
                    &format!("{}/sword/deposit", sword.uri()),
                    &format!("{}/metadata/handle/", sword.uri()),
                    None,
                    timeout,
                )
                .expect("sword client"),
            ),
            catalog: Arc::new(SolrClient::new(&solr.uri(), None, timeout).expect("solr client")),
        };

        let ledger = Arc::new(MemoryLedger::new());
        let service = IngestService::new(ledger.clone() as Arc<dyn JobLedger>, services, NAMESPACE);

        Self {
            ledger,
            service,
            public,
            restricted,
            solr,
            sword,
        }
    }
}

pub fn import_json(href: &str, state: &str, tasks: &[(&str, &str)]) -> serde_json::Value {
    let tasks: Vec<_> = tasks
        .iter()
        .map(|(task_href, task_state)| serde_json::json!({ "href": task_href, "state": task_state }))
        .collect();
    serde_json::json!({ "import": { "id": 1, "href": href, "state": state, "tasks": tasks } })
}
