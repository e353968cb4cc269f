// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable on-disk spool for not-yet-delivered events.
//!
//! One JSON-lines file per session under the spool directory. An entry's
//! presence in the file means it is pending; entries are removed only after
//! the collecting service confirmed delivery. The spool is intentionally
//! unbounded - dropping events silently is worse than using disk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use reel_qoe_core::SessionId;

use crate::error::Result;
use crate::transport::EventEnvelope;

/// A spooled event awaiting confirmed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolEntry {
	pub event: EventEnvelope,
	pub queued_at: DateTime<Utc>,
}

impl SpoolEntry {
	#[must_use]
	pub fn new(event: EventEnvelope) -> Self {
		Self {
			event,
			queued_at: Utc::now(),
		}
	}
}

/// Per-session JSON-lines spool files under one directory.
#[derive(Debug, Clone)]
pub struct EventSpool {
	dir: PathBuf,
}

impl EventSpool {
	#[must_use]
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	/// Creates the spool directory if it does not exist yet.
	pub async fn ensure_dir(&self) -> Result<()> {
		tokio::fs::create_dir_all(&self.dir).await?;
		Ok(())
	}

	fn path_for(&self, session_id: &SessionId) -> PathBuf {
		// Session IDs are caller-supplied; keep filenames tame.
		let safe: String = session_id
			.as_str()
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
					c
				} else {
					'_'
				}
			})
			.collect();
		self.dir.join(format!("{safe}.jsonl"))
	}

	/// Appends one entry to the session's spool file.
	pub async fn append(&self, session_id: &SessionId, entry: &SpoolEntry) -> Result<()> {
		self.ensure_dir().await?;
		let mut line = serde_json::to_vec(entry)?;
		line.push(b'\n');

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(self.path_for(session_id))
			.await?;
		file.write_all(&line).await?;
		file.flush().await?;
		Ok(())
	}

	/// Loads all pending entries for a session, oldest first.
	pub async fn load(&self, session_id: &SessionId) -> Result<Vec<SpoolEntry>> {
		let path = self.path_for(session_id);
		let contents = match tokio::fs::read_to_string(&path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let mut entries = Vec::new();
		for line in contents.lines() {
			if line.trim().is_empty() {
				continue;
			}
			entries.push(serde_json::from_str(line)?);
		}
		Ok(entries)
	}

	/// Replaces the first `prefix_len` entries of the session's spool file
	/// with `keep`, preserving anything appended after the prefix was
	/// loaded. Used by flush: the prefix is the snapshot it attempted, and
	/// `keep` is whatever still failed.
	pub async fn replace_prefix(
		&self,
		session_id: &SessionId,
		prefix_len: usize,
		keep: Vec<SpoolEntry>,
	) -> Result<()> {
		let current = self.load(session_id).await?;
		let tail = current.into_iter().skip(prefix_len);
		let remaining: Vec<SpoolEntry> = keep.into_iter().chain(tail).collect();

		let path = self.path_for(session_id);
		if remaining.is_empty() {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => return Err(e.into()),
			}
			return Ok(());
		}

		let mut buffer = Vec::new();
		for entry in &remaining {
			buffer.extend_from_slice(&serde_json::to_vec(entry)?);
			buffer.push(b'\n');
		}

		// Write-then-rename so a crash mid-rewrite cannot lose the file.
		let tmp = path.with_extension("jsonl.tmp");
		tokio::fs::write(&tmp, &buffer).await?;
		tokio::fs::rename(&tmp, &path).await?;
		Ok(())
	}

	/// Drops all pending entries for a session.
	pub async fn clear(&self, session_id: &SessionId) -> Result<()> {
		match tokio::fs::remove_file(self.path_for(session_id)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	/// Number of pending entries for a session.
	pub async fn pending_count(&self, session_id: &SessionId) -> usize {
		self.load(session_id).await.map_or(0, |entries| entries.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_qoe_core::{EventPayload, EventType};

	fn envelope(at_position: f64) -> EventEnvelope {
		EventEnvelope {
			user_id: "user_1".to_string(),
			media_id: "media_1".to_string(),
			event_type: EventType::BufferingEnd,
			event_data: EventPayload::BufferingEnd {
				duration_secs: 1.5,
				quality: None,
				at_position,
			},
		}
	}

	#[tokio::test]
	async fn append_then_load_roundtrips_in_order() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let session_id = SessionId::new("session_1");

		for i in 0..3 {
			spool
				.append(&session_id, &SpoolEntry::new(envelope(i as f64)))
				.await
				.unwrap();
		}

		let entries = spool.load(&session_id).await.unwrap();
		assert_eq!(entries.len(), 3);
		for (i, entry) in entries.iter().enumerate() {
			match &entry.event.event_data {
				EventPayload::BufferingEnd { at_position, .. } => {
					assert_eq!(*at_position, i as f64);
				}
				other => panic!("unexpected payload: {other:?}"),
			}
		}
	}

	#[tokio::test]
	async fn load_missing_session_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let entries = spool.load(&SessionId::new("nope")).await.unwrap();
		assert!(entries.is_empty());
	}

	#[tokio::test]
	async fn entries_survive_a_new_spool_instance() {
		let dir = tempfile::tempdir().unwrap();
		let session_id = SessionId::new("session_1");

		{
			let spool = EventSpool::new(dir.path());
			spool
				.append(&session_id, &SpoolEntry::new(envelope(1.0)))
				.await
				.unwrap();
		}

		let reopened = EventSpool::new(dir.path());
		assert_eq!(reopened.pending_count(&session_id).await, 1);
	}

	#[tokio::test]
	async fn replace_prefix_drops_delivered_and_keeps_failures() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let session_id = SessionId::new("session_1");

		let failed = SpoolEntry::new(envelope(1.0));
		spool.append(&session_id, &failed).await.unwrap();
		spool
			.append(&session_id, &SpoolEntry::new(envelope(2.0)))
			.await
			.unwrap();

		// Entry 1 failed delivery, entry 2 succeeded.
		spool
			.replace_prefix(&session_id, 2, vec![failed.clone()])
			.await
			.unwrap();

		let entries = spool.load(&session_id).await.unwrap();
		assert_eq!(entries, vec![failed]);
	}

	#[tokio::test]
	async fn replace_prefix_preserves_concurrent_appends() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let session_id = SessionId::new("session_1");

		spool
			.append(&session_id, &SpoolEntry::new(envelope(1.0)))
			.await
			.unwrap();
		let snapshot = spool.load(&session_id).await.unwrap();

		// An event arrives while the snapshot is being flushed.
		let late = SpoolEntry::new(envelope(99.0));
		spool.append(&session_id, &late).await.unwrap();

		// The snapshot was fully delivered.
		spool
			.replace_prefix(&session_id, snapshot.len(), Vec::new())
			.await
			.unwrap();

		let entries = spool.load(&session_id).await.unwrap();
		assert_eq!(entries, vec![late]);
	}

	#[tokio::test]
	async fn replace_prefix_to_empty_removes_file() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let session_id = SessionId::new("session_1");

		spool
			.append(&session_id, &SpoolEntry::new(envelope(1.0)))
			.await
			.unwrap();
		spool
			.replace_prefix(&session_id, 1, Vec::new())
			.await
			.unwrap();

		assert_eq!(spool.pending_count(&session_id).await, 0);
		assert!(!dir.path().join("session_1.jsonl").exists());
	}

	#[tokio::test]
	async fn clear_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let session_id = SessionId::new("session_1");

		spool.clear(&session_id).await.unwrap();
		spool
			.append(&session_id, &SpoolEntry::new(envelope(1.0)))
			.await
			.unwrap();
		spool.clear(&session_id).await.unwrap();
		spool.clear(&session_id).await.unwrap();
		assert_eq!(spool.pending_count(&session_id).await, 0);
	}

	#[tokio::test]
	async fn hostile_session_ids_stay_inside_the_spool_dir() {
		let dir = tempfile::tempdir().unwrap();
		let spool = EventSpool::new(dir.path());
		let session_id = SessionId::new("../escape/attempt");

		spool
			.append(&session_id, &SpoolEntry::new(envelope(1.0)))
			.await
			.unwrap();
		assert_eq!(spool.pending_count(&session_id).await, 1);
		assert!(!dir.path().parent().unwrap().join("escape").exists());
	}
}
