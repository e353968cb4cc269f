// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Critical event taxonomy and typed payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QoeError;
use crate::session::{RecordedErrorKind, SessionId, Severity};

/// Unique identifier for a stored event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for EventId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for EventId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// The critical event taxonomy. Anything outside this set is discarded at
/// classification time and rejected by the collecting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	BufferingStart,
	BufferingEnd,
	QualityChange,
	Error,
	Crash,
	SessionEnd,
}

impl EventType {
	/// Whether clients may submit this type to the event endpoint.
	///
	/// `session_end` is recorded by the collecting service itself during
	/// finalization and is not accepted from clients.
	#[must_use]
	pub fn is_client_recordable(&self) -> bool {
		!matches!(self, EventType::SessionEnd)
	}
}

impl std::fmt::Display for EventType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			EventType::BufferingStart => write!(f, "buffering_start"),
			EventType::BufferingEnd => write!(f, "buffering_end"),
			EventType::QualityChange => write!(f, "quality_change"),
			EventType::Error => write!(f, "error"),
			EventType::Crash => write!(f, "crash"),
			EventType::SessionEnd => write!(f, "session_end"),
		}
	}
}

impl std::str::FromStr for EventType {
	type Err = QoeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"buffering_start" => Ok(EventType::BufferingStart),
			"buffering_end" => Ok(EventType::BufferingEnd),
			"quality_change" => Ok(EventType::QualityChange),
			"error" => Ok(EventType::Error),
			"crash" => Ok(EventType::Crash),
			"session_end" => Ok(EventType::SessionEnd),
			_ => Err(QoeError::InvalidEventType(s.to_string())),
		}
	}
}

/// Typed payload for a critical event. One variant per event type, instead
/// of a single open record with optional fields for every case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
	BufferingStart {
		at_position: f64,
		quality: Option<String>,
	},
	BufferingEnd {
		/// Stall length in seconds, fractional.
		duration_secs: f64,
		quality: Option<String>,
		at_position: f64,
	},
	QualityChange {
		from_quality: String,
		to_quality: String,
		at_position: f64,
	},
	Error {
		code: String,
		message: String,
		at_position: f64,
		#[serde(default)]
		kind: RecordedErrorKind,
		#[serde(default)]
		severity: Severity,
	},
	Crash {
		/// Classified label, e.g. `javascript_error` or `cross_origin_error`.
		kind: String,
		message: String,
		source: Option<String>,
		line: Option<u32>,
		column: Option<u32>,
		stack: Option<String>,
		user_agent: Option<String>,
		#[serde(default = "default_crash_severity")]
		severity: Severity,
	},
	SessionEnd {},
}

fn default_crash_severity() -> Severity {
	Severity::Critical
}

impl EventPayload {
	/// The event type this payload belongs to.
	#[must_use]
	pub fn event_type(&self) -> EventType {
		match self {
			EventPayload::BufferingStart { .. } => EventType::BufferingStart,
			EventPayload::BufferingEnd { .. } => EventType::BufferingEnd,
			EventPayload::QualityChange { .. } => EventType::QualityChange,
			EventPayload::Error { .. } => EventType::Error,
			EventPayload::Crash { .. } => EventType::Crash,
			EventPayload::SessionEnd {} => EventType::SessionEnd,
		}
	}

	/// Builds a typed payload from a wire-level `(eventType, eventData)`
	/// pair, rejecting data whose shape does not match the declared type.
	pub fn from_event_data(
		event_type: EventType,
		data: serde_json::Value,
	) -> Result<Self, QoeError> {
		let mut data = match data {
			serde_json::Value::Object(map) => map,
			serde_json::Value::Null => serde_json::Map::new(),
			_ => {
				return Err(QoeError::InvalidEventData(
					"event data must be a JSON object".to_string(),
				))
			}
		};
		data.insert(
			"type".to_string(),
			serde_json::Value::String(event_type.to_string()),
		);
		serde_json::from_value(serde_json::Value::Object(data))
			.map_err(|e| QoeError::InvalidEventData(e.to_string()))
	}
}

/// An immutable fact about a playback moment. Write-once; the timestamp is
/// assigned by the collecting service at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QoeEvent {
	pub id: EventId,
	pub session_id: SessionId,
	pub user_id: String,
	pub media_id: String,
	pub payload: EventPayload,
	pub timestamp: DateTime<Utc>,
}

impl QoeEvent {
	/// Creates an event stamped with the current time.
	#[must_use]
	pub fn new(
		session_id: SessionId,
		user_id: impl Into<String>,
		media_id: impl Into<String>,
		payload: EventPayload,
	) -> Self {
		Self {
			id: EventId::new(),
			session_id,
			user_id: user_id.into(),
			media_id: media_id.into(),
			payload,
			timestamp: Utc::now(),
		}
	}

	#[must_use]
	pub fn event_type(&self) -> EventType {
		self.payload.event_type()
	}
}
