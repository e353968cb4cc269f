// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database pool construction and schema bootstrap.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;

use crate::error::{QoeServerError, Result};

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./reel.db")
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| QoeServerError::InvalidData(format!("invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Creates the QoE tables and indexes if they do not exist yet.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS qoe_sessions (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			media_id TEXT NOT NULL,
			media_title TEXT,
			device_class TEXT NOT NULL,
			os_info TEXT,
			app_version TEXT,
			network_class TEXT NOT NULL,
			user_agent TEXT,
			endpoint_info TEXT NOT NULL DEFAULT '{}',
			started_at TEXT NOT NULL,
			ended_at TEXT,
			total_session_duration INTEGER,
			total_watch_duration INTEGER NOT NULL DEFAULT 0,
			completed_percentage REAL,
			last_playback_position REAL,
			buffering_events TEXT NOT NULL DEFAULT '[]',
			total_buffering_time REAL NOT NULL DEFAULT 0,
			total_buffering_count INTEGER NOT NULL DEFAULT 0,
			buffering_percentage REAL NOT NULL DEFAULT 0,
			quality_changes TEXT NOT NULL DEFAULT '[]',
			total_quality_changes INTEGER NOT NULL DEFAULT 0,
			final_quality TEXT,
			playback_errors TEXT NOT NULL DEFAULT '[]',
			total_errors INTEGER NOT NULL DEFAULT 0,
			error_rate REAL NOT NULL DEFAULT 0,
			recorded_error_count INTEGER NOT NULL DEFAULT 0,
			recorded_crash_count INTEGER NOT NULL DEFAULT 0,
			qoe_score INTEGER NOT NULL DEFAULT 100,
			status TEXT NOT NULL,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS qoe_recorded_errors (
			id TEXT PRIMARY KEY,
			session_id TEXT NOT NULL REFERENCES qoe_sessions(id) ON DELETE CASCADE,
			kind TEXT NOT NULL,
			message TEXT,
			code TEXT,
			at_position REAL,
			severity TEXT NOT NULL,
			occurred_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS qoe_recorded_crashes (
			id TEXT PRIMARY KEY,
			session_id TEXT NOT NULL REFERENCES qoe_sessions(id) ON DELETE CASCADE,
			kind TEXT NOT NULL,
			message TEXT,
			severity TEXT NOT NULL,
			occurred_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS qoe_events (
			id TEXT PRIMARY KEY,
			session_id TEXT NOT NULL,
			user_id TEXT NOT NULL,
			media_id TEXT NOT NULL,
			event_type TEXT NOT NULL,
			payload TEXT NOT NULL,
			timestamp TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	for statement in [
		"CREATE INDEX IF NOT EXISTS idx_qoe_sessions_media_started ON qoe_sessions(media_id, started_at)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_sessions_user_started ON qoe_sessions(user_id, started_at)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_sessions_status ON qoe_sessions(status)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_sessions_started ON qoe_sessions(started_at)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_recorded_errors_session ON qoe_recorded_errors(session_id)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_recorded_crashes_session ON qoe_recorded_crashes(session_id)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_events_session ON qoe_events(session_id)",
		"CREATE INDEX IF NOT EXISTS idx_qoe_events_timestamp ON qoe_events(timestamp)",
	] {
		sqlx::query(statement).execute(pool).await?;
	}

	tracing::debug!("qoe schema ready");
	Ok(())
}

/// In-memory pool with the full schema, for tests.
///
/// Capped at one connection: every new connection to `:memory:` opens its
/// own empty database.
pub async fn create_test_pool() -> SqlitePool {
	let pool = sqlx::sqlite::SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.unwrap();
	migrate(&pool).await.unwrap();
	pool
}
