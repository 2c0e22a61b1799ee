//! Pulse Rules - Rule Engine Library
//!
//! Classifies digital input snapshots against the configured rule table:
//! - Bit-pattern matching with first-match-wins semantics
//! - SQLite persistence for the rule table
//! - A compiled in-memory cache with hot reload
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │ InputVector  │────▶│ PatternCache  │────▶│   Matcher    │
//! │  (16 lines)  │     │  (compiled)   │     │ (9-bit scan) │
//! └──────────────┘     └───────────────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌───────────────┐
//!                      │  Repository   │
//!                      │   (SQLite)    │
//!                      └───────────────┘
//! ```

mod cache;
mod error;
mod matcher;
pub mod repository;

// Re-export public API
pub use cache::{PatternCache, RuleTableSource, SqliteRuleSource, StaticRuleSource};
pub use error::{Result, RuleError};
pub use matcher::{match_pattern, window_at, CompiledRules, RuleMask};
pub use repository::{
    delete_mapping, find_mapping, get_mapping, insert_mapping, load_all_mappings,
    update_mapping, PATTERN_MAPPINGS_TABLE,
};
