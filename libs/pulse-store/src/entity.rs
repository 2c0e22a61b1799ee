//! Per-entity SQL mapping
//!
//! Each persisted type states its own table, key lookup, insert and update.
//! The generic upsert, retry replay and reconciliation code only ever talks
//! to this trait.

use async_trait::async_trait;
use pulse_model::{MachineEvent, PatternMapping, Record};
use pulse_rules::repository as rules_repo;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use crate::error::Result;

#[async_trait]
pub trait SqlEntity: Record {
    /// Backing table name
    const TABLE: &'static str;

    async fn find_by_key(conn: &mut SqliteConnection, key: i64) -> Result<Option<Self>>;

    /// Insert; a zero key lets SQLite assign one. Returns the stored key.
    async fn insert(conn: &mut SqliteConnection, record: &Self) -> Result<i64>;

    /// Overwrite the row with `record`'s key; returns rows affected
    async fn update(conn: &mut SqliteConnection, record: &Self) -> Result<u64>;

    async fn load_all(conn: &mut SqliteConnection) -> Result<Vec<Self>>;

    async fn delete_by_key(conn: &mut SqliteConnection, key: i64) -> Result<bool>;
}

/// DDL for recorded machine events
pub const MACHINE_EVENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS machine_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status_id INTEGER,
        machine_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        epoch_ms INTEGER NOT NULL,
        additional_information TEXT,
        spindle_running INTEGER NOT NULL DEFAULT 0,
        feed_hold INTEGER NOT NULL DEFAULT 0,
        dry_run INTEGER NOT NULL DEFAULT 0,
        m00_m01 INTEGER NOT NULL DEFAULT 0,
        in_alarm INTEGER NOT NULL DEFAULT 0,
        in_cycle INTEGER NOT NULL DEFAULT 0,
        feedrate_less_than_100 INTEGER NOT NULL DEFAULT 0,
        feed_rate_is_100 INTEGER NOT NULL DEFAULT 0,
        feedrate_more_than_100 INTEGER NOT NULL DEFAULT 0
    )
"#;

#[async_trait]
impl SqlEntity for MachineEvent {
    const TABLE: &'static str = "machine_events";

    async fn find_by_key(conn: &mut SqliteConnection, key: i64) -> Result<Option<Self>> {
        let row = sqlx::query(
            r#"
            SELECT id, status_id, machine_id, timestamp, epoch_ms, additional_information,
                   spindle_running, feed_hold, dry_run, m00_m01, in_alarm, in_cycle,
                   feedrate_less_than_100, feed_rate_is_100, feedrate_more_than_100
            FROM machine_events WHERE id = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.as_ref().map(hydrate_event).transpose()?)
    }

    async fn insert(conn: &mut SqliteConnection, e: &Self) -> Result<i64> {
        let id = (e.id != 0).then_some(e.id);
        let result = sqlx::query(
            r#"
            INSERT INTO machine_events (
                id, status_id, machine_id, timestamp, epoch_ms, additional_information,
                spindle_running, feed_hold, dry_run, m00_m01, in_alarm, in_cycle,
                feedrate_less_than_100, feed_rate_is_100, feedrate_more_than_100
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(e.status_id)
        .bind(e.machine_id)
        .bind(e.timestamp)
        .bind(e.epoch_ms)
        .bind(&e.additional_information)
        .bind(e.spindle_running)
        .bind(e.feed_hold)
        .bind(e.dry_run)
        .bind(e.m00_m01)
        .bind(e.in_alarm)
        .bind(e.in_cycle)
        .bind(e.feedrate_less_than_100)
        .bind(e.feed_rate_is_100)
        .bind(e.feedrate_more_than_100)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(conn: &mut SqliteConnection, e: &Self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE machine_events SET
                status_id = ?, machine_id = ?, timestamp = ?, epoch_ms = ?,
                additional_information = ?, spindle_running = ?, feed_hold = ?,
                dry_run = ?, m00_m01 = ?, in_alarm = ?, in_cycle = ?,
                feedrate_less_than_100 = ?, feed_rate_is_100 = ?, feedrate_more_than_100 = ?
            WHERE id = ?
            "#,
        )
        .bind(e.status_id)
        .bind(e.machine_id)
        .bind(e.timestamp)
        .bind(e.epoch_ms)
        .bind(&e.additional_information)
        .bind(e.spindle_running)
        .bind(e.feed_hold)
        .bind(e.dry_run)
        .bind(e.m00_m01)
        .bind(e.in_alarm)
        .bind(e.in_cycle)
        .bind(e.feedrate_less_than_100)
        .bind(e.feed_rate_is_100)
        .bind(e.feedrate_more_than_100)
        .bind(e.id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn load_all(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status_id, machine_id, timestamp, epoch_ms, additional_information,
                   spindle_running, feed_hold, dry_run, m00_m01, in_alarm, in_cycle,
                   feedrate_less_than_100, feed_rate_is_100, feedrate_more_than_100
            FROM machine_events ORDER BY id ASC
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(hydrate_event(&row)?);
        }
        Ok(events)
    }

    async fn delete_by_key(conn: &mut SqliteConnection, key: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM machine_events WHERE id = ?")
            .bind(key)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn hydrate_event(row: &SqliteRow) -> std::result::Result<MachineEvent, sqlx::Error> {
    Ok(MachineEvent {
        id: row.try_get("id")?,
        status_id: row.try_get("status_id")?,
        machine_id: row.try_get("machine_id")?,
        timestamp: row.try_get("timestamp")?,
        epoch_ms: row.try_get("epoch_ms")?,
        additional_information: row.try_get("additional_information")?,
        spindle_running: row.try_get("spindle_running")?,
        feed_hold: row.try_get("feed_hold")?,
        dry_run: row.try_get("dry_run")?,
        m00_m01: row.try_get("m00_m01")?,
        in_alarm: row.try_get("in_alarm")?,
        in_cycle: row.try_get("in_cycle")?,
        feedrate_less_than_100: row.try_get("feedrate_less_than_100")?,
        feed_rate_is_100: row.try_get("feed_rate_is_100")?,
        feedrate_more_than_100: row.try_get("feedrate_more_than_100")?,
    })
}

// Rule rows reuse the rule engine's repository
#[async_trait]
impl SqlEntity for PatternMapping {
    const TABLE: &'static str = "pattern_mappings";

    async fn find_by_key(conn: &mut SqliteConnection, key: i64) -> Result<Option<Self>> {
        Ok(rules_repo::find_mapping(&mut *conn, key).await?)
    }

    async fn insert(conn: &mut SqliteConnection, record: &Self) -> Result<i64> {
        Ok(rules_repo::insert_mapping(&mut *conn, record).await?)
    }

    async fn update(conn: &mut SqliteConnection, record: &Self) -> Result<u64> {
        Ok(rules_repo::update_mapping(&mut *conn, record).await?)
    }

    async fn load_all(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        Ok(rules_repo::load_all_mappings(&mut *conn).await?)
    }

    async fn delete_by_key(conn: &mut SqliteConnection, key: i64) -> Result<bool> {
        Ok(rules_repo::delete_mapping(&mut *conn, key).await?)
    }
}
