// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository layer for QoE database operations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

use reel_qoe_core::{
	BufferingInterval, FinalMetrics, PlaybackErrorRecord, QoeEvent, QualityShift, RecordedCrash,
	RecordedError, Session, SessionId,
};

use crate::error::{QoeServerError, Result};

/// Time/media window over finalized sessions. `end` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct SessionWindow {
	pub start: Option<DateTime<Utc>>,
	pub end: Option<DateTime<Utc>>,
	pub media_id: Option<String>,
}

/// Everything `POST /session/{id}/end` writes, applied wholesale so a
/// retried finalize converges on the same row instead of appending twice.
#[derive(Debug, Clone)]
pub struct SessionFinalization {
	pub ended_at: DateTime<Utc>,
	pub metrics: FinalMetrics,
	pub total_watch_duration: i64,
	pub completed_percentage: f64,
	pub last_playback_position: f64,
	pub buffering_events: Vec<BufferingInterval>,
	pub quality_changes: Vec<QualityShift>,
	pub playback_errors: Vec<PlaybackErrorRecord>,
	pub final_quality: Option<String>,
}

/// Repository trait for QoE operations.
#[async_trait]
pub trait QoeRepository: Send + Sync {
	// Session operations
	async fn create_session(&self, session: &Session) -> Result<()>;
	async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;
	async fn session_exists(&self, id: &SessionId) -> Result<bool>;
	async fn finalize_session(
		&self,
		id: &SessionId,
		update: &SessionFinalization,
	) -> Result<Option<Session>>;

	// Event operations
	async fn insert_event(&self, event: &QoeEvent) -> Result<()>;
	async fn count_events(&self, id: &SessionId) -> Result<u64>;

	// Recorded error/crash appends; must be safe under concurrent callers
	async fn append_recorded_error(&self, id: &SessionId, error: &RecordedError) -> Result<()>;
	async fn append_recorded_crash(&self, id: &SessionId, crash: &RecordedCrash) -> Result<()>;

	// Aggregation reads, paged so large windows never need one unbounded scan
	async fn list_finalized_sessions(
		&self,
		window: &SessionWindow,
		limit: u32,
		offset: u32,
	) -> Result<Vec<Session>>;
	async fn recorded_kind_frequencies(
		&self,
		window: &SessionWindow,
	) -> Result<HashMap<String, u64>>;
}

/// SQLite implementation of the QoE repository.
#[derive(Clone)]
pub struct SqliteQoeRepository {
	pool: SqlitePool,
}

impl SqliteQoeRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	async fn load_recorded_errors(&self, id: &SessionId) -> Result<Vec<RecordedError>> {
		let rows = sqlx::query_as::<_, RecordedErrorRow>(
			r#"
			SELECT kind, message, code, at_position, severity, occurred_at
			FROM qoe_recorded_errors
			WHERE session_id = ?
			ORDER BY occurred_at ASC, id ASC
			"#,
		)
		.bind(id.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	async fn load_recorded_crashes(&self, id: &SessionId) -> Result<Vec<RecordedCrash>> {
		let rows = sqlx::query_as::<_, RecordedCrashRow>(
			r#"
			SELECT kind, message, severity, occurred_at
			FROM qoe_recorded_crashes
			WHERE session_id = ?
			ORDER BY occurred_at ASC, id ASC
			"#,
		)
		.bind(id.as_str())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}
}

// Database row structs for mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
	id: String,
	user_id: String,
	media_id: String,
	media_title: Option<String>,
	device_class: String,
	os_info: Option<String>,
	app_version: Option<String>,
	network_class: String,
	user_agent: Option<String>,
	endpoint_info: String,
	started_at: String,
	ended_at: Option<String>,
	total_session_duration: Option<i64>,
	total_watch_duration: i64,
	completed_percentage: Option<f64>,
	last_playback_position: Option<f64>,
	buffering_events: String,
	total_buffering_time: f64,
	total_buffering_count: i64,
	buffering_percentage: f64,
	quality_changes: String,
	total_quality_changes: i64,
	final_quality: Option<String>,
	playback_errors: String,
	total_errors: i64,
	error_rate: f64,
	recorded_error_count: i64,
	recorded_crash_count: i64,
	qoe_score: i64,
	status: String,
	created_at: String,
	updated_at: String,
}

const SESSION_COLUMNS: &str = r#"id, user_id, media_id, media_title,
	device_class, os_info, app_version, network_class, user_agent, endpoint_info,
	started_at, ended_at, total_session_duration,
	total_watch_duration, completed_percentage, last_playback_position,
	buffering_events, total_buffering_time, total_buffering_count, buffering_percentage,
	quality_changes, total_quality_changes, final_quality,
	playback_errors, total_errors, error_rate,
	recorded_error_count, recorded_crash_count,
	qoe_score, status, created_at, updated_at"#;

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| QoeServerError::InvalidData(format!("invalid {field}: {e}")))
}

impl TryFrom<SessionRow> for Session {
	type Error = QoeServerError;

	fn try_from(row: SessionRow) -> Result<Self> {
		Ok(Session {
			session_id: SessionId::new(row.id),
			user_id: row.user_id,
			media_id: row.media_id,
			media_title: row.media_title,
			device_class: row
				.device_class
				.parse()
				.map_err(|e| QoeServerError::InvalidData(format!("invalid device class: {e}")))?,
			os_info: row.os_info,
			app_version: row.app_version,
			network_class: row
				.network_class
				.parse()
				.map_err(|e| QoeServerError::InvalidData(format!("invalid network class: {e}")))?,
			user_agent: row.user_agent,
			endpoint_info: serde_json::from_str(&row.endpoint_info)?,
			started_at: parse_timestamp(&row.started_at, "started_at")?,
			ended_at: row
				.ended_at
				.as_deref()
				.map(|s| parse_timestamp(s, "ended_at"))
				.transpose()?,
			total_session_duration: row.total_session_duration,
			total_watch_duration: row.total_watch_duration,
			completed_percentage: row.completed_percentage,
			last_playback_position: row.last_playback_position,
			buffering_events: serde_json::from_str(&row.buffering_events)?,
			total_buffering_time: row.total_buffering_time,
			total_buffering_count: row.total_buffering_count as u32,
			buffering_percentage: row.buffering_percentage,
			quality_changes: serde_json::from_str(&row.quality_changes)?,
			total_quality_changes: row.total_quality_changes as u32,
			final_quality: row.final_quality,
			playback_errors: serde_json::from_str(&row.playback_errors)?,
			total_errors: row.total_errors as u32,
			error_rate: row.error_rate,
			recorded_errors: Vec::new(),
			recorded_error_count: row.recorded_error_count as u32,
			recorded_crashes: Vec::new(),
			recorded_crash_count: row.recorded_crash_count as u32,
			qoe_score: row.qoe_score as u8,
			status: row
				.status
				.parse()
				.map_err(|e| QoeServerError::InvalidData(format!("invalid status: {e}")))?,
			created_at: parse_timestamp(&row.created_at, "created_at")?,
			updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct RecordedErrorRow {
	kind: String,
	message: Option<String>,
	code: Option<String>,
	at_position: Option<f64>,
	severity: String,
	occurred_at: String,
}

impl TryFrom<RecordedErrorRow> for RecordedError {
	type Error = QoeServerError;

	fn try_from(row: RecordedErrorRow) -> Result<Self> {
		Ok(RecordedError {
			kind: row
				.kind
				.parse()
				.map_err(|e| QoeServerError::InvalidData(format!("invalid error kind: {e}")))?,
			message: row.message,
			code: row.code,
			at_position: row.at_position,
			severity: row
				.severity
				.parse()
				.map_err(|e| QoeServerError::InvalidData(format!("invalid severity: {e}")))?,
			occurred_at: parse_timestamp(&row.occurred_at, "occurred_at")?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct RecordedCrashRow {
	kind: String,
	message: Option<String>,
	severity: String,
	occurred_at: String,
}

impl TryFrom<RecordedCrashRow> for RecordedCrash {
	type Error = QoeServerError;

	fn try_from(row: RecordedCrashRow) -> Result<Self> {
		Ok(RecordedCrash {
			kind: row.kind,
			message: row.message,
			severity: row
				.severity
				.parse()
				.map_err(|e| QoeServerError::InvalidData(format!("invalid severity: {e}")))?,
			occurred_at: parse_timestamp(&row.occurred_at, "occurred_at")?,
		})
	}
}

#[async_trait]
impl QoeRepository for SqliteQoeRepository {
	#[instrument(skip(self, session), fields(session_id = %session.session_id))]
	async fn create_session(&self, session: &Session) -> Result<()> {
		let endpoint_info = serde_json::to_string(&session.endpoint_info)?;
		let buffering_events = serde_json::to_string(&session.buffering_events)?;
		let quality_changes = serde_json::to_string(&session.quality_changes)?;
		let playback_errors = serde_json::to_string(&session.playback_errors)?;

		let result = sqlx::query(
			r#"
			INSERT INTO qoe_sessions (
				id, user_id, media_id, media_title,
				device_class, os_info, app_version, network_class, user_agent, endpoint_info,
				started_at, ended_at, total_session_duration,
				total_watch_duration, completed_percentage, last_playback_position,
				buffering_events, total_buffering_time, total_buffering_count, buffering_percentage,
				quality_changes, total_quality_changes, final_quality,
				playback_errors, total_errors, error_rate,
				recorded_error_count, recorded_crash_count,
				qoe_score, status, created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(session.session_id.as_str())
		.bind(&session.user_id)
		.bind(&session.media_id)
		.bind(&session.media_title)
		.bind(session.device_class.to_string())
		.bind(&session.os_info)
		.bind(&session.app_version)
		.bind(session.network_class.to_string())
		.bind(&session.user_agent)
		.bind(endpoint_info)
		.bind(session.started_at.to_rfc3339())
		.bind(session.ended_at.map(|dt| dt.to_rfc3339()))
		.bind(session.total_session_duration)
		.bind(session.total_watch_duration)
		.bind(session.completed_percentage)
		.bind(session.last_playback_position)
		.bind(buffering_events)
		.bind(session.total_buffering_time)
		.bind(session.total_buffering_count as i64)
		.bind(session.buffering_percentage)
		.bind(quality_changes)
		.bind(session.total_quality_changes as i64)
		.bind(&session.final_quality)
		.bind(playback_errors)
		.bind(session.total_errors as i64)
		.bind(session.error_rate)
		.bind(session.recorded_error_count as i64)
		.bind(session.recorded_crash_count as i64)
		.bind(session.qoe_score as i64)
		.bind(session.status.to_string())
		.bind(session.created_at.to_rfc3339())
		.bind(session.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
				QoeServerError::DuplicateSession(session.session_id.to_string()),
			),
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self), fields(session_id = %id))]
	async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
		let row = sqlx::query_as::<_, SessionRow>(&format!(
			"SELECT {SESSION_COLUMNS} FROM qoe_sessions WHERE id = ?"
		))
		.bind(id.as_str())
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};
		let mut session: Session = row.try_into()?;
		session.recorded_errors = self.load_recorded_errors(id).await?;
		session.recorded_crashes = self.load_recorded_crashes(id).await?;
		Ok(Some(session))
	}

	#[instrument(skip(self), fields(session_id = %id))]
	async fn session_exists(&self, id: &SessionId) -> Result<bool> {
		let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM qoe_sessions WHERE id = ?")
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await?;
		Ok(row.is_some())
	}

	#[instrument(skip(self, update), fields(session_id = %id))]
	async fn finalize_session(
		&self,
		id: &SessionId,
		update: &SessionFinalization,
	) -> Result<Option<Session>> {
		let buffering_events = serde_json::to_string(&update.buffering_events)?;
		let quality_changes = serde_json::to_string(&update.quality_changes)?;
		let playback_errors = serde_json::to_string(&update.playback_errors)?;
		let now = Utc::now();

		let result = sqlx::query(
			r#"
			UPDATE qoe_sessions SET
				ended_at = ?,
				total_session_duration = ?,
				total_watch_duration = ?,
				completed_percentage = ?,
				last_playback_position = ?,
				buffering_events = ?,
				total_buffering_time = ?,
				total_buffering_count = ?,
				buffering_percentage = ?,
				quality_changes = ?,
				total_quality_changes = ?,
				final_quality = ?,
				playback_errors = ?,
				total_errors = ?,
				error_rate = ?,
				qoe_score = ?,
				status = ?,
				updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(update.ended_at.to_rfc3339())
		.bind(update.metrics.total_session_duration)
		.bind(update.total_watch_duration)
		.bind(update.completed_percentage)
		.bind(update.last_playback_position)
		.bind(buffering_events)
		.bind(update.metrics.total_buffering_time)
		.bind(update.metrics.total_buffering_count as i64)
		.bind(update.metrics.buffering_percentage)
		.bind(quality_changes)
		.bind(update.metrics.total_quality_changes as i64)
		.bind(&update.final_quality)
		.bind(playback_errors)
		.bind(update.metrics.total_errors as i64)
		.bind(update.metrics.error_rate)
		.bind(update.metrics.qoe_score as i64)
		.bind(update.metrics.status.to_string())
		.bind(now.to_rfc3339())
		.bind(id.as_str())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Ok(None);
		}
		self.get_session(id).await
	}

	#[instrument(skip(self, event), fields(session_id = %event.session_id, event_type = %event.event_type()))]
	async fn insert_event(&self, event: &QoeEvent) -> Result<()> {
		let payload = serde_json::to_string(&event.payload)?;

		sqlx::query(
			r#"
			INSERT INTO qoe_events (id, session_id, user_id, media_id, event_type, payload, timestamp)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(event.id.to_string())
		.bind(event.session_id.as_str())
		.bind(&event.user_id)
		.bind(&event.media_id)
		.bind(event.event_type().to_string())
		.bind(payload)
		.bind(event.timestamp.to_rfc3339())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[instrument(skip(self), fields(session_id = %id))]
	async fn count_events(&self, id: &SessionId) -> Result<u64> {
		let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM qoe_events WHERE session_id = ?")
			.bind(id.as_str())
			.fetch_one(&self.pool)
			.await?;
		Ok(row.0 as u64)
	}

	#[instrument(skip(self, error), fields(session_id = %id, kind = %error.kind))]
	async fn append_recorded_error(&self, id: &SessionId, error: &RecordedError) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			r#"
			INSERT INTO qoe_recorded_errors (id, session_id, kind, message, code, at_position, severity, occurred_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::now_v7().to_string())
		.bind(id.as_str())
		.bind(error.kind.to_string())
		.bind(&error.message)
		.bind(&error.code)
		.bind(error.at_position)
		.bind(error.severity.to_string())
		.bind(error.occurred_at.to_rfc3339())
		.execute(&mut *tx)
		.await?;

		sqlx::query(
			r#"
			UPDATE qoe_sessions
			SET recorded_error_count = recorded_error_count + 1, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(Utc::now().to_rfc3339())
		.bind(id.as_str())
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(())
	}

	#[instrument(skip(self, crash), fields(session_id = %id, kind = %crash.kind))]
	async fn append_recorded_crash(&self, id: &SessionId, crash: &RecordedCrash) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			r#"
			INSERT INTO qoe_recorded_crashes (id, session_id, kind, message, severity, occurred_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(Uuid::now_v7().to_string())
		.bind(id.as_str())
		.bind(&crash.kind)
		.bind(&crash.message)
		.bind(crash.severity.to_string())
		.bind(crash.occurred_at.to_rfc3339())
		.execute(&mut *tx)
		.await?;

		sqlx::query(
			r#"
			UPDATE qoe_sessions
			SET recorded_crash_count = recorded_crash_count + 1, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(Utc::now().to_rfc3339())
		.bind(id.as_str())
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(())
	}

	#[instrument(skip(self, window))]
	async fn list_finalized_sessions(
		&self,
		window: &SessionWindow,
		limit: u32,
		offset: u32,
	) -> Result<Vec<Session>> {
		let rows = sqlx::query_as::<_, SessionRow>(&format!(
			r#"
			SELECT {SESSION_COLUMNS} FROM qoe_sessions
			WHERE status IN ('completed', 'abandoned')
			  AND (?1 IS NULL OR started_at >= ?1)
			  AND (?2 IS NULL OR started_at < ?2)
			  AND (?3 IS NULL OR media_id = ?3)
			ORDER BY started_at ASC, id ASC
			LIMIT ?4 OFFSET ?5
			"#
		))
		.bind(window.start.map(|dt| dt.to_rfc3339()))
		.bind(window.end.map(|dt| dt.to_rfc3339()))
		.bind(&window.media_id)
		.bind(limit as i64)
		.bind(offset as i64)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(TryInto::try_into).collect()
	}

	#[instrument(skip(self, window))]
	async fn recorded_kind_frequencies(
		&self,
		window: &SessionWindow,
	) -> Result<HashMap<String, u64>> {
		let mut frequencies = HashMap::new();

		for table in ["qoe_recorded_errors", "qoe_recorded_crashes"] {
			let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
				r#"
				SELECT r.kind, COUNT(*) FROM {table} r
				JOIN qoe_sessions s ON s.id = r.session_id
				WHERE s.status IN ('completed', 'abandoned')
				  AND (?1 IS NULL OR s.started_at >= ?1)
				  AND (?2 IS NULL OR s.started_at < ?2)
				  AND (?3 IS NULL OR s.media_id = ?3)
				GROUP BY r.kind
				"#
			))
			.bind(window.start.map(|dt| dt.to_rfc3339()))
			.bind(window.end.map(|dt| dt.to_rfc3339()))
			.bind(&window.media_id)
			.fetch_all(&self.pool)
			.await?;

			for (kind, count) in rows {
				*frequencies.entry(kind).or_insert(0) += count as u64;
			}
		}

		Ok(frequencies)
	}
}
