//! Log database migrations - embedded SQL files
//!
//! Applied to logs.duckdb by the same `MigrationService` that manages the
//! main database.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_event_log.sql", include_str!("001_event_log.sql")),
];
