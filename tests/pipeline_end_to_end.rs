//! Full harvest, dispatch and reconcile run with in-memory collaborators

use std::sync::Arc;

use catalog_harvester::application::{Collaborators, HarvestPipeline, StepStatus};
use catalog_harvester::domain::{ListingPage, normalize};
use catalog_harvester::infrastructure::config::AppConfig;
use catalog_harvester::infrastructure::json_store;
use catalog_harvester::test_utils::{
    RecordingSink, ScriptedListingSource, StaticDetailSource, listing_page, product_payload,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn key(i: u32) -> String {
    normalize(&format!("https://shop.test/p/{i}?sku={i}&utm_source=listing"))
        .unwrap()
        .into_string()
}

fn config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.source.categories = vec!["almacen".into(), "bebidas".into()];
    config.source.store_id = Some("210000000011".into());
    config.crawl.workers = 1;
    config.crawl.page_delay_ms = 0;
    config.extraction.workers = 2;
    config.extraction.delay_min_ms = 0;
    config.extraction.delay_max_ms = 0;
    config.delivery.batch_size = 1;
    config.delivery.batch_delay_ms = 0;
    config.delivery.record_delay_ms = 0;
    config.storage.output_dir = dir.path().join("output");
    config.storage.batch_dir = dir.path().join("batches");
    config.storage.residual_dir = dir.path().join("batches_errors");
    config
}

fn listing() -> ScriptedListingSource {
    ScriptedListingSource::new()
        .with_category(
            "almacen",
            vec![Ok(listing_page("p", 0..3, None)), Ok(ListingPage::default())],
        )
        .with_category(
            "bebidas",
            vec![Ok(listing_page("p", 2..4, None)), Ok(ListingPage::default())],
        )
}

fn details() -> StaticDetailSource {
    StaticDetailSource::new()
        .with(&key(0), Ok(Some(product_payload("SKU0", "10"))))
        .with(&key(1), Ok(Some(json!({"@type": "Product", "sku": "SKU1", "name": "Sin precio"}))))
        .with(&key(2), Ok(Some(product_payload("SKU2", "$ 1.234,50"))))
}

#[tokio::test]
async fn run_harvests_dispatches_and_reconciles() {
    let dir = TempDir::new().unwrap();
    let batch_sink = Arc::new(RecordingSink::new().rejecting_identifier("SKU2"));
    let record_sink = Arc::new(RecordingSink::new());
    let pipeline = HarvestPipeline::new(
        config(&dir),
        Collaborators {
            listing: Arc::new(listing()),
            detail: Arc::new(details()),
            batch_sink: batch_sink.clone(),
            record_sink: record_sink.clone(),
        },
    );

    let summary = pipeline.run(&CancellationToken::new(), true).await.unwrap();

    assert!(summary.all_ok());
    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.discarded, 2);
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.recovered, 1);
    assert_eq!(summary.residual, 0);
    assert_eq!(
        summary.steps.iter().map(|s| s.name).collect::<Vec<_>>(),
        vec!["harvest", "dispatch", "reconcile"]
    );

    let products: Vec<Value> = json_store::read_json(&dir.path().join("output/products.json"))
        .await
        .unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["productEan"], "SKU0");
    assert_eq!(products[0]["storeRut"], json!(210_000_000_011_u64));
    assert_eq!(products[1]["productPrice"], 1234.5);
    assert_eq!(products[1]["categoryName"], "almacen");

    let discards: Vec<Value> = json_store::read_json(&dir.path().join("output/discards.json"))
        .await
        .unwrap();
    let codes: Vec<&str> = discards.iter().filter_map(|d| d["reason"]["code"].as_str()).collect();
    assert_eq!(codes, vec!["MISSING_PRICE", "NO_STRUCTURED_DATA"]);

    assert_eq!(batch_sink.call_sizes().await, vec![1, 1]);
    assert_eq!(record_sink.call_count().await, 1);
    assert!(pipeline.failure_store().list_batches().await.unwrap().is_empty());

    let log: Vec<Value> = json_store::read_json(&dir.path().join("output/batch_errors_log.json"))
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["status"], "422");
}

#[tokio::test]
async fn cancelled_run_keeps_outputs_and_skips_delivery() {
    let dir = TempDir::new().unwrap();
    let batch_sink = Arc::new(RecordingSink::new());
    let pipeline = HarvestPipeline::new(
        config(&dir),
        Collaborators {
            listing: Arc::new(listing()),
            detail: Arc::new(details()),
            batch_sink: batch_sink.clone(),
            record_sink: Arc::new(RecordingSink::new()),
        },
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = pipeline.run(&cancel, true).await.unwrap();

    assert_eq!(summary.steps[0].status, StepStatus::Ok);
    assert!(matches!(summary.steps[1].status, StepStatus::Skipped(_)));
    assert!(matches!(summary.steps[2].status, StepStatus::Skipped(_)));
    assert_eq!(batch_sink.call_count().await, 0);
    assert!(dir.path().join("output/products.json").exists());
}

#[tokio::test]
async fn import_splits_valid_and_invalid_records() {
    let dir = TempDir::new().unwrap();
    let import_dir = dir.path().join("import");
    tokio::fs::create_dir_all(&import_dir).await.unwrap();
    let file = json!([
        {"productEan": "A1", "productName": "Arroz", "productPrice": "55", "categoryName": "Almacen"},
        {"productEan": "A2", "productName": "", "productPrice": "55", "categoryName": "Almacen"},
        {"productEan": "A3", "productName": "Aceite", "productPrice": 120.5, "categoryName": "Almacen"}
    ]);
    tokio::fs::write(import_dir.join("tienda.json"), file.to_string()).await.unwrap();

    let batch_sink = Arc::new(RecordingSink::new());
    let pipeline = HarvestPipeline::new(
        config(&dir),
        Collaborators {
            listing: Arc::new(ScriptedListingSource::new()),
            detail: Arc::new(StaticDetailSource::new()),
            batch_sink: batch_sink.clone(),
            record_sink: Arc::new(RecordingSink::new()),
        },
    );

    let report = pipeline.import(&import_dir).await.unwrap();

    assert_eq!(report.valid, 2);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.dispatch.delivered_count, 2);
    assert_eq!(batch_sink.call_sizes().await, vec![1, 1]);

    let invalid_path = report.invalid_path.unwrap();
    assert_eq!(invalid_path, import_dir.join("import_errores.json"));
    let invalid: Vec<Value> = json_store::read_json(&invalid_path).await.unwrap();
    assert_eq!(invalid[0]["productEan"], "A2");
    assert_eq!(invalid[0]["_errores"], json!(["SIN_NOMBRE"]));
}

#[tokio::test]
async fn importing_the_output_directory_reads_only_products() {
    let dir = TempDir::new().unwrap();
    let pipeline = HarvestPipeline::new(
        config(&dir),
        Collaborators {
            listing: Arc::new(listing()),
            detail: Arc::new(details()),
            batch_sink: Arc::new(RecordingSink::new().rejecting_identifier("SKU2")),
            record_sink: Arc::new(RecordingSink::new().rejecting_identifier("SKU2")),
        },
    );
    let summary = pipeline.run(&CancellationToken::new(), false).await.unwrap();
    assert_eq!(summary.failed_batches, 1);

    let output = dir.path().join("output");
    assert!(output.join("discards.json").exists());
    assert!(output.join("batch_errors_log.json").exists());

    let report = pipeline.import(&output).await.unwrap();

    assert_eq!(report.valid, 2);
    assert_eq!(report.invalid, 0);
    assert!(report.invalid_path.is_none());
    assert!(report.skipped_files.is_empty());
    assert!(!output.join("output_errores.json").exists());
}

#[tokio::test]
async fn import_accepts_records_keyed_by_web_id() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("tienda.json");
    let records = json!([{
        "idWeb": 12345,
        "productName": "Leche",
        "productPrice": 45.5,
        "storeRut": 210_094_030_014_u64,
        "categoryName": "Lacteos"
    }]);
    tokio::fs::write(&file, records.to_string()).await.unwrap();

    let batch_sink = Arc::new(RecordingSink::new());
    let pipeline = HarvestPipeline::new(
        config(&dir),
        Collaborators {
            listing: Arc::new(ScriptedListingSource::new()),
            detail: Arc::new(StaticDetailSource::new()),
            batch_sink: batch_sink.clone(),
            record_sink: Arc::new(RecordingSink::new()),
        },
    );

    let report = pipeline.import(&file).await.unwrap();

    assert_eq!(report.valid, 1);
    assert_eq!(report.invalid, 0);
    assert_eq!(report.dispatch.delivered_count, 1);
    assert_eq!(batch_sink.call_sizes().await, vec![1]);
}

#[tokio::test]
async fn missing_categories_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.source.categories.clear();
    let pipeline = HarvestPipeline::new(
        config,
        Collaborators {
            listing: Arc::new(ScriptedListingSource::new()),
            detail: Arc::new(StaticDetailSource::new()),
            batch_sink: Arc::new(RecordingSink::new()),
            record_sink: Arc::new(RecordingSink::new()),
        },
    );

    assert!(pipeline.run(&CancellationToken::new(), true).await.is_err());
}
