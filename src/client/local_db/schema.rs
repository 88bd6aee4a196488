//! Database Schema Definitions
//!
//! Contains schema-related constants and utilities.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i64] = &[1];

/// Bookkeeping table, created before any migration runs.
pub const CREATE_MIGRATIONS_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
)";

/// Migration 1: the mutation queue and its secondary indexes.
///
/// `created_at` and `last_attempt_at` are unix milliseconds so that ordering
/// by them is exact.
pub const MIGRATION_1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS mutation_queue (
        id TEXT PRIMARY KEY NOT NULL,
        mutation_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        sync_status TEXT NOT NULL DEFAULT 'pending',
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_attempt_at INTEGER,
        last_error TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_mutation_queue_type ON mutation_queue(mutation_type)",
    "CREATE INDEX IF NOT EXISTS idx_mutation_queue_status ON mutation_queue(sync_status)",
    "CREATE INDEX IF NOT EXISTS idx_mutation_queue_created_at ON mutation_queue(created_at)",
];

/// Statements for a single migration version.
pub fn migration_statements(version: i64) -> &'static [&'static str] {
    match version {
        1 => MIGRATION_1,
        _ => &[],
    }
}

/// Check if database needs migration
pub fn needs_migration(current_version: i64) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i64) -> Vec<i64> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}
