//! Reconciliation and publication against mocked GeoServer and Solr

mod common;

use chrono::{Duration, Utc};
use common::{import_json, Harness, ITEM_URI};
use kepler_common::AccessLevel;
use kepler_server::ledger::JobLedger;
use kepler_server::models::{Item, Job, JobStatus};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RECORD: &str = r#"{"uuid":"X"}"#;

async fn item_with_record(h: &Harness, uri: &str) -> Item {
    let item = h.ledger.get_or_create_item(uri).await.unwrap();
    h.ledger.set_item_record(item.id, RECORD).await.unwrap();
    item
}

async fn pending_job(h: &Harness, item: &Item, import_url: String, minutes_ago: i64) -> Job {
    let job = Job {
        status: JobStatus::Pending,
        import_url: Some(import_url),
        time: Utc::now() - Duration::minutes(minutes_ago),
        ..Job::new(item.id)
    };
    h.ledger.insert_job(&job).await.unwrap();
    job
}

async fn mock_status(server: &MockServer, import: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(import))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn expect_deletes(server: &MockServer, import: &str, times: u64) {
    Mock::given(method("DELETE"))
        .and(path(format!("{}/tasks/0", import)))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(import))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
}

async fn expect_solr(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("POST"))
        .and(path("/update"))
        .and(query_param("commit", "true"))
        .and(body_json(json!([{ "uuid": "X" }])))
        .respond_with(ResponseTemplate::new(status))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_complete_import_is_published() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.public, import, import_json(&import_url, "COMPLETE", &[(&task, "COMPLETE")])).await;
    expect_deletes(&h.public, import, 1).await;
    expect_solr(&h.solr, 200, 1).await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.completed, 1);

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_message.is_none());
}

#[tokio::test]
async fn test_missing_crs_fails_job() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.public, import, import_json(&import_url, "PENDING", &[(&task, "NO_CRS")])).await;
    expect_deletes(&h.public, import, 1).await;
    expect_solr(&h.solr, 200, 0).await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.failed, 1);

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("Missing CRS"));
}

#[tokio::test]
async fn test_task_error_fails_job() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.public, import, import_json(&import_url, "PENDING", &[(&task, "ERROR")])).await;
    expect_deletes(&h.public, import, 1).await;

    h.service.reconcile().await.unwrap();

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("Task error"));
}

#[tokio::test]
async fn test_running_import_stays_pending() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.public, import, import_json(&import_url, "PENDING", &[(&task, "READY")])).await;
    expect_deletes(&h.public, import, 0).await;
    expect_solr(&h.solr, 200, 0).await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.converging, 1);

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_missing_import_fails_with_diagnostic() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/404";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url, 1).await;

    Mock::given(method("GET"))
        .and(path(import))
        .respond_with(ResponseTemplate::new(404).set_body_string("No such import"))
        .mount(&h.public)
        .await;
    // Tasks are unknown, so only the import itself is deleted
    Mock::given(method("DELETE"))
        .and(path(import))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.public)
        .await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.failed, 1);

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.expect("diagnostic");
    assert!(message.contains("404"), "unexpected diagnostic: {}", message);
    assert!(message.contains("No such import"));
}

#[tokio::test]
async fn test_unreadable_status_still_deletes_import() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url, 1).await;

    Mock::given(method("GET"))
        .and(path(import))
        .respond_with(ResponseTemplate::new(500).set_body_string("transient"))
        .mount(&h.public)
        .await;
    Mock::given(method("DELETE"))
        .and(path(import))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.public)
        .await;

    h.service.reconcile().await.unwrap();

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("transient"));
}

#[tokio::test]
async fn test_every_task_is_deleted_before_import() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let first = format!("{}/tasks/0", import_url);
    let second = format!("{}/tasks/1", import_url);
    mock_status(
        &h.public,
        import,
        import_json(&import_url, "PENDING", &[(&first, "NO_CRS"), (&second, "READY")]),
    )
    .await;
    for task in ["/rest/imports/1/tasks/0", "/rest/imports/1/tasks/1", import] {
        Mock::given(method("DELETE"))
            .and(path(task))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&h.public)
            .await;
    }

    h.service.reconcile().await.unwrap();
    assert_eq!(h.ledger.get_job(job.id).await.unwrap().status, JobStatus::Failed);

    let deletes: Vec<String> = h
        .public
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        deletes,
        vec!["/rest/imports/1/tasks/0", "/rest/imports/1/tasks/1", "/rest/imports/1"]
    );
}

#[tokio::test]
async fn test_publication_failure_fails_job() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.public, import, import_json(&import_url, "COMPLETE", &[(&task, "COMPLETE")])).await;
    expect_deletes(&h.public, import, 1).await;
    expect_solr(&h.solr, 500, 1).await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.failed, 1);

    let job = h.ledger.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.error_message.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_only_latest_job_per_item_is_advanced() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let old_url = format!("{}/rest/imports/1", h.public.uri());
    let new_url = format!("{}/rest/imports/2", h.public.uri());
    let old = pending_job(&h, &item, old_url.clone(), 30).await;
    let new = pending_job(&h, &item, new_url.clone(), 1).await;

    Mock::given(method("GET"))
        .and(path("/rest/imports/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(import_json(&old_url, "COMPLETE", &[])))
        .expect(0)
        .mount(&h.public)
        .await;
    let task = format!("{}/tasks/0", new_url);
    mock_status(&h.public, "/rest/imports/2", import_json(&new_url, "PENDING", &[(&task, "NO_CRS")])).await;
    expect_deletes(&h.public, "/rest/imports/2", 1).await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.examined, 1);

    assert_eq!(h.ledger.get_job(new.id).await.unwrap().status, JobStatus::Failed);
    assert_eq!(h.ledger.get_job(old.id).await.unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_restricted_items_poll_restricted_instance() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    h.ledger.set_item_access(item.id, AccessLevel::Restricted).await.unwrap();
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.restricted.uri(), import);
    let job = pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.restricted, import, import_json(&import_url, "COMPLETE", &[(&task, "COMPLETE")])).await;
    expect_deletes(&h.restricted, import, 1).await;
    expect_solr(&h.solr, 200, 1).await;

    h.service.reconcile().await.unwrap();
    assert_eq!(h.ledger.get_job(job.id).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_failed_job_does_not_block_others() {
    let h = Harness::start().await;
    let broken = item_with_record(&h, ITEM_URI).await;
    let healthy = item_with_record(&h, "db1b972e-5f34-5957-a520-d8b4eb565314").await;

    let broken_url = format!("{}/rest/imports/1", h.public.uri());
    let healthy_url = format!("{}/rest/imports/2", h.public.uri());
    let broken_job = pending_job(&h, &broken, broken_url, 2).await;
    let healthy_job = pending_job(&h, &healthy, healthy_url.clone(), 1).await;

    Mock::given(method("GET"))
        .and(path("/rest/imports/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&h.public)
        .await;
    let task = format!("{}/tasks/0", healthy_url);
    mock_status(&h.public, "/rest/imports/2", import_json(&healthy_url, "COMPLETE", &[(&task, "COMPLETE")])).await;
    expect_deletes(&h.public, "/rest/imports/2", 1).await;
    expect_solr(&h.solr, 200, 1).await;

    let report = h.service.reconcile().await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 1);

    let broken_job = h.ledger.get_job(broken_job.id).await.unwrap();
    assert_eq!(broken_job.status, JobStatus::Failed);
    assert!(broken_job.error_message.unwrap().contains("Unexpected response"));
    assert_eq!(h.ledger.get_job(healthy_job.id).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_reconcile_is_safe_to_rerun() {
    let h = Harness::start().await;
    let item = item_with_record(&h, ITEM_URI).await;
    let import = "/rest/imports/1";
    let import_url = format!("{}{}", h.public.uri(), import);
    pending_job(&h, &item, import_url.clone(), 1).await;

    let task = format!("{}/tasks/0", import_url);
    mock_status(&h.public, import, import_json(&import_url, "COMPLETE", &[(&task, "COMPLETE")])).await;
    expect_deletes(&h.public, import, 1).await;
    expect_solr(&h.solr, 200, 1).await;

    h.service.reconcile().await.unwrap();
    let second = h.service.reconcile().await.unwrap();
    assert_eq!(second.examined, 0);
}
