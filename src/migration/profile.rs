// ABOUTME: Target profile value object holding every engine-specific behaviour flag
// ABOUTME: DDL generation and data transfer branch on this instead of on connection types

use std::collections::BTreeMap;

use crate::config::TargetConfig;
use crate::connection::Dialect;
use crate::migration::typemap::TargetEngine;

/// Engine-specific rules for the destination database.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetProfile {
    pub dialect: Dialect,
    pub engine: TargetEngine,
    /// Whether every CREATE TABLE can share one transaction.
    pub supports_ddl_transactions: bool,
    /// Whether a table's inserts can be wrapped in one transaction.
    pub supports_data_transactions: bool,
    /// `(name, value)` pragmas applied once after all tables exist.
    pub post_create_pragmas: Vec<(String, String)>,
}

impl TargetProfile {
    pub fn postgres() -> Self {
        Self {
            dialect: Dialect::Postgres,
            engine: TargetEngine::RelationalFull,
            supports_ddl_transactions: true,
            supports_data_transactions: true,
            post_create_pragmas: Vec::new(),
        }
    }

    pub fn sqlite(pragmas: &BTreeMap<String, String>) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            engine: TargetEngine::EmbeddedLite,
            supports_ddl_transactions: true,
            supports_data_transactions: true,
            post_create_pragmas: pragmas
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn for_target(config: &TargetConfig) -> Self {
        match config {
            TargetConfig::Postgres(_) => Self::postgres(),
            TargetConfig::Sqlite(sqlite) => Self::sqlite(&sqlite.pragmas),
        }
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    /// Positional placeholder list for an INSERT with `count` columns.
    pub fn placeholders(&self, count: usize) -> String {
        (1..=count)
            .map(|i| self.dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Pragma statements to run after table creation.
    pub fn pragma_statements(&self) -> Vec<String> {
        if self.dialect != Dialect::Sqlite {
            return Vec::new();
        }
        self.post_create_pragmas
            .iter()
            .map(|(name, value)| format!("PRAGMA {}={}", name, value))
            .collect()
    }
}
