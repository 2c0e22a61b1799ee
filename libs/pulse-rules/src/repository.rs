//! Rule table repository - SQLite persistence for pattern mappings
//!
//! Every function takes any SQLite executor so it can run against a pool or
//! inside a caller's transaction.

use pulse_model::PatternMapping;
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};

use crate::error::{Result, RuleError};

/// DDL for the rule table; identical on primary and fallback stores
pub const PATTERN_MAPPINGS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS pattern_mappings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        machine_class TEXT,
        status_description TEXT,
        rising_edge_reason_required INTEGER,
        falling_edge_reason_required INTEGER,
        spindle_running INTEGER,
        feed_hold INTEGER,
        dry_run INTEGER,
        m00_m01 INTEGER,
        in_alarm INTEGER,
        in_cycle INTEGER,
        feed_rate_lt_100 INTEGER,
        feed_rate_100 INTEGER,
        feed_rate_gt_100 INTEGER,
        red_lamp INTEGER NOT NULL DEFAULT 0,
        amber_lamp INTEGER NOT NULL DEFAULT 0,
        green_lamp INTEGER NOT NULL DEFAULT 0,
        input_status TEXT NOT NULL DEFAULT 'Default Status',
        output_status TEXT NOT NULL DEFAULT 'Default Status'
    )
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT id, machine_class, status_description,
           rising_edge_reason_required, falling_edge_reason_required,
           spindle_running, feed_hold, dry_run, m00_m01, in_alarm, in_cycle,
           feed_rate_lt_100, feed_rate_100, feed_rate_gt_100,
           red_lamp, amber_lamp, green_lamp, input_status, output_status
    FROM pattern_mappings
"#;

/// Load the whole rule table in table order (by id)
pub async fn load_all_mappings<'e, E>(executor: E) -> Result<Vec<PatternMapping>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} ORDER BY id ASC", SELECT_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(executor).await?;

    let mut mappings = Vec::with_capacity(rows.len());
    for row in rows {
        mappings.push(hydrate_mapping(&row)?);
    }
    Ok(mappings)
}

/// Find one rule by id
pub async fn find_mapping<'e, E>(executor: E, id: i64) -> Result<Option<PatternMapping>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.as_ref().map(hydrate_mapping).transpose()
}

/// Get one rule by id, `NotFound` if absent
pub async fn get_mapping<'e, E>(executor: E, id: i64) -> Result<PatternMapping>
where
    E: SqliteExecutor<'e>,
{
    find_mapping(executor, id)
        .await?
        .ok_or(RuleError::NotFound(id))
}

/// Insert a rule. A zero id lets SQLite assign one; returns the stored id.
pub async fn insert_mapping<'e, E>(executor: E, m: &PatternMapping) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let id = (m.id != 0).then_some(m.id);
    let result = sqlx::query(
        r#"
        INSERT INTO pattern_mappings (
            id, machine_class, status_description,
            rising_edge_reason_required, falling_edge_reason_required,
            spindle_running, feed_hold, dry_run, m00_m01, in_alarm, in_cycle,
            feed_rate_lt_100, feed_rate_100, feed_rate_gt_100,
            red_lamp, amber_lamp, green_lamp, input_status, output_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&m.machine_class)
    .bind(&m.status_description)
    .bind(m.rising_edge_reason_required)
    .bind(m.falling_edge_reason_required)
    .bind(m.id0)
    .bind(m.id1)
    .bind(m.id2)
    .bind(m.id3)
    .bind(m.id4)
    .bind(m.id5)
    .bind(m.id6)
    .bind(m.id7)
    .bind(m.id8)
    .bind(m.od0)
    .bind(m.od1)
    .bind(m.od2)
    .bind(&m.input_status)
    .bind(&m.output_status)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrite every column of an existing rule; returns rows affected
pub async fn update_mapping<'e, E>(executor: E, m: &PatternMapping) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE pattern_mappings SET
            machine_class = ?, status_description = ?,
            rising_edge_reason_required = ?, falling_edge_reason_required = ?,
            spindle_running = ?, feed_hold = ?, dry_run = ?, m00_m01 = ?,
            in_alarm = ?, in_cycle = ?, feed_rate_lt_100 = ?, feed_rate_100 = ?,
            feed_rate_gt_100 = ?, red_lamp = ?, amber_lamp = ?, green_lamp = ?,
            input_status = ?, output_status = ?
        WHERE id = ?
        "#,
    )
    .bind(&m.machine_class)
    .bind(&m.status_description)
    .bind(m.rising_edge_reason_required)
    .bind(m.falling_edge_reason_required)
    .bind(m.id0)
    .bind(m.id1)
    .bind(m.id2)
    .bind(m.id3)
    .bind(m.id4)
    .bind(m.id5)
    .bind(m.id6)
    .bind(m.id7)
    .bind(m.id8)
    .bind(m.od0)
    .bind(m.od1)
    .bind(m.od2)
    .bind(&m.input_status)
    .bind(&m.output_status)
    .bind(m.id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Delete a rule; returns whether a row was removed
pub async fn delete_mapping<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM pattern_mappings WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn hydrate_mapping(row: &SqliteRow) -> Result<PatternMapping> {
    let mut mapping = PatternMapping {
        id: row.try_get("id")?,
        machine_class: row.try_get("machine_class")?,
        status_description: row.try_get("status_description")?,
        rising_edge_reason_required: row.try_get("rising_edge_reason_required")?,
        falling_edge_reason_required: row.try_get("falling_edge_reason_required")?,
        od0: row.try_get("red_lamp")?,
        od1: row.try_get("amber_lamp")?,
        od2: row.try_get("green_lamp")?,
        input_status: row.try_get("input_status")?,
        output_status: row.try_get("output_status")?,
        ..Default::default()
    };
    mapping.set_classification_bits([
        row.try_get("spindle_running")?,
        row.try_get("feed_hold")?,
        row.try_get("dry_run")?,
        row.try_get("m00_m01")?,
        row.try_get("in_alarm")?,
        row.try_get("in_cycle")?,
        row.try_get("feed_rate_lt_100")?,
        row.try_get("feed_rate_100")?,
        row.try_get("feed_rate_gt_100")?,
    ]);
    Ok(mapping)
}
