//! Whole-gateway runs against file-backed stores in a temp directory

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::path::Path;
use std::time::Duration;

use common::sqlite::SqliteClient;
use iosrv::{Gateway, IoSrvConfig};
use pulse_model::PatternMapping;
use pulse_store::schema::ensure_primary_schema;
use tempfile::TempDir;

const WAIT_STEP: Duration = Duration::from_millis(20);

fn config(dir: &Path, enable_fallback: bool) -> IoSrvConfig {
    let mut config = IoSrvConfig::default();
    config.machine.machine_id = 42;
    config.database.primary_path = dir.join("primary.db");
    config.database.fallback_path = dir.join("fallback.db");
    config.database.enable_fallback = enable_fallback;
    config.database.store_retry_attempts = 1;
    config.connection.reconnect_interval_ms = 50;
    config.blink.period_ms = 10;
    config.blink.duration_ms = 50;
    config.simulation.enabled = false;
    config.sync.run_on_startup = true;
    config
}

/// Red lamp whenever the spindle runs
async fn seed_primary(path: &Path) {
    let client = SqliteClient::new(path).await.unwrap();
    ensure_primary_schema(client.pool()).await.unwrap();
    let mut bits = [None; 9];
    bits[0] = Some(true);
    let rule = PatternMapping::new(1, bits, [true, false, false]).with_status("Running", "Red");
    pulse_rules::insert_mapping(client.pool(), &rule).await.unwrap();
    client.close().await;
}

async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return true;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    false
}

fn spindle_running() -> Vec<bool> {
    let mut lines = vec![false; 16];
    lines[0] = true;
    lines
}

async fn matched_events(gateway: &Gateway) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM machine_events WHERE status_id = 1 AND machine_id = 42",
    )
    .fetch_one(gateway.primary().pool())
    .await
    .unwrap()
}

#[tokio::test]
async fn test_rules_sync_to_fallback_and_drive_outputs() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), true);
    seed_primary(&config.database.primary_path).await;

    let gateway = Gateway::start(&config).await.unwrap();
    let gw = &gateway;

    // Startup sync copies the rule and the cache reloads
    assert!(wait_until(move || async move { !gw.cache().rules().await.is_empty() }).await);
    assert!(wait_until(move || async move { gw.input_supervisor().is_connected() }).await);

    gateway.input_module().set_inputs(spindle_running());

    assert!(wait_until(move || async move { gw.output_module().outputs()[0] }).await);
    assert!(wait_until(move || async move { matched_events(gw).await == 1 }).await);
    assert!(gateway.queue().is_empty().await.unwrap());

    gateway.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_without_fallback_rules_come_from_primary() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), false);
    seed_primary(&config.database.primary_path).await;

    let gateway = Gateway::start(&config).await.unwrap();
    let gw = &gateway;
    assert!(wait_until(move || async move { gw.input_supervisor().is_connected() }).await);

    gateway.input_module().set_inputs(spindle_running());

    assert!(wait_until(move || async move { gw.output_module().outputs()[0] }).await);
    assert!(wait_until(move || async move { matched_events(gw).await == 1 }).await);
    assert!(!dir.path().join("fallback.db").exists());

    gateway.shutdown(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_shutdown_disconnects_devices() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), false);

    let gateway = Gateway::start(&config).await.unwrap();
    let gw = &gateway;
    assert!(wait_until(move || async move { gw.input_supervisor().is_connected() }).await);

    let input = gateway.input_module().clone();
    let output = gateway.output_module().clone();
    gateway.shutdown(Duration::from_secs(2)).await;

    assert!(!input.is_connected());
    assert!(!output.is_connected());
}
