//! Rule table cache
//!
//! Holds the compiled rule table in memory. The table is loaded lazily on
//! the first match and replaced wholesale on reload, so a match never sees a
//! half-updated table.

use std::sync::Arc;

use async_trait::async_trait;
use pulse_model::PatternMapping;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::matcher::CompiledRules;
use crate::repository;

/// Where the rule table comes from
#[async_trait]
pub trait RuleTableSource: Send + Sync {
    /// Full rule table in table order
    async fn load_all(&self) -> Result<Vec<PatternMapping>>;
}

/// Rule table stored in a SQLite database
pub struct SqliteRuleSource {
    pool: SqlitePool,
}

impl SqliteRuleSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleTableSource for SqliteRuleSource {
    async fn load_all(&self) -> Result<Vec<PatternMapping>> {
        repository::load_all_mappings(&self.pool).await
    }
}

/// Fixed in-memory rule table
pub struct StaticRuleSource(pub Vec<PatternMapping>);

#[async_trait]
impl RuleTableSource for StaticRuleSource {
    async fn load_all(&self) -> Result<Vec<PatternMapping>> {
        Ok(self.0.clone())
    }
}

struct RuleTable {
    rules: Vec<PatternMapping>,
    compiled: CompiledRules,
}

/// Cached, compiled rule table
pub struct PatternCache {
    source: Arc<dyn RuleTableSource>,
    table: RwLock<Option<Arc<RuleTable>>>,
}

impl PatternCache {
    pub fn new(source: Arc<dyn RuleTableSource>) -> Self {
        Self {
            source,
            table: RwLock::new(None),
        }
    }

    /// Cache over a SQLite rule table
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::new(Arc::new(SqliteRuleSource::new(pool)))
    }

    /// Load the rule table from the source, replacing any cached copy
    pub async fn load(&self) -> Result<usize> {
        let rules = self.source.load_all().await?;
        let count = rules.len();
        let compiled = CompiledRules::compile(&rules);

        *self.table.write().await = Some(Arc::new(RuleTable { rules, compiled }));
        info!("Loaded {} pattern mappings", count);
        Ok(count)
    }

    /// Reload rule table (hot reload)
    pub async fn reload(&self) -> Result<usize> {
        info!("Reloading pattern mappings...");
        self.load().await
    }

    pub async fn is_loaded(&self) -> bool {
        self.table.read().await.is_some()
    }

    /// Snapshot of the cached rules (empty until loaded)
    pub async fn rules(&self) -> Vec<PatternMapping> {
        self.table
            .read()
            .await
            .as_ref()
            .map(|t| t.rules.clone())
            .unwrap_or_default()
    }

    /// Classify a snapshot, loading the table first if needed
    pub async fn match_inputs(&self, inputs: &[bool]) -> Result<Option<PatternMapping>> {
        // Read guard must drop before load() takes the write lock
        let cached = self.table.read().await.clone();
        let table = match cached {
            Some(table) => table,
            None => {
                self.load().await?;
                let loaded = self.table.read().await.clone();
                match loaded {
                    Some(table) => table,
                    None => return Ok(None),
                }
            },
        };

        let hit = table.compiled.match_inputs(inputs)?;
        if let Some(idx) = hit {
            debug!("Input matched pattern {}", table.rules[idx].id);
        }
        Ok(hit.map(|idx| table.rules[idx].clone()))
    }
}
