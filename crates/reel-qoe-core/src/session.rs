// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session types for playback QoE tracking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel user identifier for sessions without an identified user.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Unique identifier for a playback session.
///
/// Session IDs are caller-generated and opaque; `generate()` produces a
/// time-ordered one, but any non-empty string a client supplies is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
	/// Wraps an existing caller-supplied identifier.
	#[must_use]
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Generates a fresh time-ordered identifier.
	#[must_use]
	pub fn generate() -> Self {
		Self(Uuid::now_v7().to_string())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A single playback attempt, from first play to end/abandon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
	pub session_id: SessionId,
	/// Defaults to [`ANONYMOUS_USER`] when the client does not identify one.
	pub user_id: String,
	pub media_id: String,
	pub media_title: Option<String>,

	pub device_class: DeviceClass,
	pub os_info: Option<String>,
	pub app_version: Option<String>,
	pub network_class: NetworkClass,
	pub user_agent: Option<String>,
	/// Opaque delivery-endpoint descriptor. Keys are strings; values are
	/// arbitrary JSON and are not interpreted by this system.
	pub endpoint_info: HashMap<String, serde_json::Value>,

	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	/// Wall-clock session length in seconds, set at finalization.
	pub total_session_duration: Option<i64>,

	pub total_watch_duration: i64,
	pub completed_percentage: Option<f64>,
	pub last_playback_position: Option<f64>,

	pub buffering_events: Vec<BufferingInterval>,
	pub total_buffering_time: f64,
	pub total_buffering_count: u32,
	pub buffering_percentage: f64,

	pub quality_changes: Vec<QualityShift>,
	pub total_quality_changes: u32,
	pub final_quality: Option<String>,

	pub playback_errors: Vec<PlaybackErrorRecord>,
	pub total_errors: u32,
	pub error_rate: f64,

	/// Errors captured by event recording (network loss, load failures, ...),
	/// distinct from player-reported playback errors.
	pub recorded_errors: Vec<RecordedError>,
	pub recorded_error_count: u32,
	pub recorded_crashes: Vec<RecordedCrash>,
	pub recorded_crash_count: u32,

	/// 0-100; stays at 100 while the session is active.
	pub qoe_score: u8,
	pub status: SessionStatus,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Device and network context captured at session start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
	pub media_title: Option<String>,
	pub device_class: DeviceClass,
	pub os_info: Option<String>,
	pub app_version: Option<String>,
	pub network_class: NetworkClass,
	pub user_agent: Option<String>,
	pub endpoint_info: HashMap<String, serde_json::Value>,
}

impl Session {
	/// Creates an active session starting now.
	#[must_use]
	pub fn new(
		session_id: SessionId,
		user_id: Option<String>,
		media_id: impl Into<String>,
		context: SessionContext,
	) -> Self {
		let now = Utc::now();
		Self {
			session_id,
			user_id: user_id.unwrap_or_else(|| ANONYMOUS_USER.to_string()),
			media_id: media_id.into(),
			media_title: context.media_title,
			device_class: context.device_class,
			os_info: context.os_info,
			app_version: context.app_version,
			network_class: context.network_class,
			user_agent: context.user_agent,
			endpoint_info: context.endpoint_info,
			started_at: now,
			ended_at: None,
			total_session_duration: None,
			total_watch_duration: 0,
			completed_percentage: None,
			last_playback_position: None,
			buffering_events: Vec::new(),
			total_buffering_time: 0.0,
			total_buffering_count: 0,
			buffering_percentage: 0.0,
			quality_changes: Vec::new(),
			total_quality_changes: 0,
			final_quality: None,
			playback_errors: Vec::new(),
			total_errors: 0,
			error_rate: 0.0,
			recorded_errors: Vec::new(),
			recorded_error_count: 0,
			recorded_crashes: Vec::new(),
			recorded_crash_count: 0,
			qoe_score: 100,
			status: SessionStatus::Active,
			created_at: now,
			updated_at: now,
		}
	}

	/// Appends a recorded error and keeps the counter in step.
	pub fn add_recorded_error(&mut self, error: RecordedError) {
		self.recorded_errors.push(error);
		self.recorded_error_count = self.recorded_errors.len() as u32;
	}

	/// Appends a recorded crash and keeps the counter in step.
	pub fn add_recorded_crash(&mut self, crash: RecordedCrash) {
		self.recorded_crashes.push(crash);
		self.recorded_crash_count = self.recorded_crashes.len() as u32;
	}

	/// Recorded errors plus recorded crashes.
	#[must_use]
	pub fn total_recorded_issues(&self) -> u32 {
		self.recorded_error_count + self.recorded_crash_count
	}

	/// Whether the session has been finalized.
	#[must_use]
	pub fn is_finalized(&self) -> bool {
		matches!(
			self.status,
			SessionStatus::Completed | SessionStatus::Abandoned | SessionStatus::Error
		)
	}
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	/// Playback is ongoing
	Active,
	/// Playback is paused
	Paused,
	/// Session ended with >= 90% of the media watched
	Completed,
	/// Session ended before 90% of the media was watched
	Abandoned,
	/// Session ended due to an unrecoverable error
	Error,
}

impl std::fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SessionStatus::Active => write!(f, "active"),
			SessionStatus::Paused => write!(f, "paused"),
			SessionStatus::Completed => write!(f, "completed"),
			SessionStatus::Abandoned => write!(f, "abandoned"),
			SessionStatus::Error => write!(f, "error"),
		}
	}
}

impl std::str::FromStr for SessionStatus {
	type Err = crate::error::QoeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"active" => Ok(SessionStatus::Active),
			"paused" => Ok(SessionStatus::Paused),
			"completed" => Ok(SessionStatus::Completed),
			"abandoned" => Ok(SessionStatus::Abandoned),
			"error" => Ok(SessionStatus::Error),
			_ => Err(crate::error::QoeError::InvalidStatus(s.to_string())),
		}
	}
}

/// Device class of the playback client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
	Mobile,
	Tablet,
	#[default]
	Desktop,
}

impl std::fmt::Display for DeviceClass {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DeviceClass::Mobile => write!(f, "mobile"),
			DeviceClass::Tablet => write!(f, "tablet"),
			DeviceClass::Desktop => write!(f, "desktop"),
		}
	}
}

impl std::str::FromStr for DeviceClass {
	type Err = crate::error::QoeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"mobile" => Ok(DeviceClass::Mobile),
			"tablet" => Ok(DeviceClass::Tablet),
			"desktop" => Ok(DeviceClass::Desktop),
			_ => Err(crate::error::QoeError::InvalidDeviceClass(s.to_string())),
		}
	}
}

/// Network class of the playback client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkClass {
	#[serde(rename = "wifi")]
	Wifi,
	#[serde(rename = "2g")]
	TwoG,
	#[serde(rename = "3g")]
	ThreeG,
	#[serde(rename = "4g")]
	FourG,
	#[serde(rename = "5g")]
	FiveG,
	#[default]
	#[serde(rename = "unknown")]
	Unknown,
}

impl std::fmt::Display for NetworkClass {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			NetworkClass::Wifi => write!(f, "wifi"),
			NetworkClass::TwoG => write!(f, "2g"),
			NetworkClass::ThreeG => write!(f, "3g"),
			NetworkClass::FourG => write!(f, "4g"),
			NetworkClass::FiveG => write!(f, "5g"),
			NetworkClass::Unknown => write!(f, "unknown"),
		}
	}
}

impl std::str::FromStr for NetworkClass {
	type Err = crate::error::QoeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"wifi" => Ok(NetworkClass::Wifi),
			"2g" => Ok(NetworkClass::TwoG),
			"3g" => Ok(NetworkClass::ThreeG),
			"4g" => Ok(NetworkClass::FourG),
			"5g" => Ok(NetworkClass::FiveG),
			"unknown" => Ok(NetworkClass::Unknown),
			_ => Err(crate::error::QoeError::InvalidNetworkClass(s.to_string())),
		}
	}
}

/// One rebuffering interval during playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferingInterval {
	/// Video position (seconds) when buffering began.
	pub start_position: f64,
	/// Video position (seconds) when playback resumed.
	pub end_position: f64,
	/// Wall-clock stall length in seconds, fractional.
	pub duration_secs: f64,
	/// Quality level active when the stall began.
	pub quality: Option<String>,
	pub started_at: DateTime<Utc>,
}

/// One adaptive-bitrate quality change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityShift {
	pub from_quality: String,
	pub to_quality: String,
	pub at_position: f64,
	pub occurred_at: DateTime<Utc>,
}

/// One player-reported playback error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackErrorRecord {
	pub code: String,
	pub message: String,
	pub at_position: f64,
	pub occurred_at: DateTime<Utc>,
}

/// Category of an error captured by event recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedErrorKind {
	NetworkError,
	LoadingError,
	InitializationError,
	#[default]
	PlaybackError,
}

impl std::fmt::Display for RecordedErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			RecordedErrorKind::NetworkError => write!(f, "network_error"),
			RecordedErrorKind::LoadingError => write!(f, "loading_error"),
			RecordedErrorKind::InitializationError => write!(f, "initialization_error"),
			RecordedErrorKind::PlaybackError => write!(f, "playback_error"),
		}
	}
}

impl std::str::FromStr for RecordedErrorKind {
	type Err = crate::error::QoeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"network_error" => Ok(RecordedErrorKind::NetworkError),
			"loading_error" => Ok(RecordedErrorKind::LoadingError),
			"initialization_error" => Ok(RecordedErrorKind::InitializationError),
			"playback_error" => Ok(RecordedErrorKind::PlaybackError),
			_ => Err(crate::error::QoeError::InvalidErrorKind(s.to_string())),
		}
	}
}

/// Severity of a recorded error or crash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Low,
	#[default]
	Normal,
	Critical,
}

impl std::fmt::Display for Severity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Severity::Low => write!(f, "low"),
			Severity::Normal => write!(f, "normal"),
			Severity::Critical => write!(f, "critical"),
		}
	}
}

impl std::str::FromStr for Severity {
	type Err = crate::error::QoeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"low" => Ok(Severity::Low),
			"normal" => Ok(Severity::Normal),
			"critical" => Ok(Severity::Critical),
			_ => Err(crate::error::QoeError::InvalidSeverity(s.to_string())),
		}
	}
}

/// An error captured by event recording (as opposed to the player's own
/// error callback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
	pub kind: RecordedErrorKind,
	pub message: Option<String>,
	pub code: Option<String>,
	pub at_position: Option<f64>,
	pub severity: Severity,
	pub occurred_at: DateTime<Utc>,
}

/// A captured client crash. The kind is a free-form classified label such as
/// `javascript_error` or `cross_origin_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCrash {
	pub kind: String,
	pub message: Option<String>,
	pub severity: Severity,
	pub occurred_at: DateTime<Utc>,
}

impl RecordedCrash {
	/// Creates a crash record with the default `critical` severity.
	#[must_use]
	pub fn new(kind: impl Into<String>, message: Option<String>) -> Self {
		Self {
			kind: kind.into(),
			message,
			severity: Severity::Critical,
			occurred_at: Utc::now(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn session_status_roundtrip(status in prop_oneof![
			Just(SessionStatus::Active),
			Just(SessionStatus::Paused),
			Just(SessionStatus::Completed),
			Just(SessionStatus::Abandoned),
			Just(SessionStatus::Error),
		]) {
			let s = status.to_string();
			let parsed: SessionStatus = s.parse().unwrap();
			prop_assert_eq!(status, parsed);
		}

		#[test]
		fn device_class_roundtrip(device in prop_oneof![
			Just(DeviceClass::Mobile),
			Just(DeviceClass::Tablet),
			Just(DeviceClass::Desktop),
		]) {
			let s = device.to_string();
			let parsed: DeviceClass = s.parse().unwrap();
			prop_assert_eq!(device, parsed);
		}

		#[test]
		fn network_class_roundtrip(network in prop_oneof![
			Just(NetworkClass::Wifi),
			Just(NetworkClass::TwoG),
			Just(NetworkClass::ThreeG),
			Just(NetworkClass::FourG),
			Just(NetworkClass::FiveG),
			Just(NetworkClass::Unknown),
		]) {
			let s = network.to_string();
			let parsed: NetworkClass = s.parse().unwrap();
			prop_assert_eq!(network, parsed);
		}

		#[test]
		fn recorded_error_kind_roundtrip(kind in prop_oneof![
			Just(RecordedErrorKind::NetworkError),
			Just(RecordedErrorKind::LoadingError),
			Just(RecordedErrorKind::InitializationError),
			Just(RecordedErrorKind::PlaybackError),
		]) {
			let s = kind.to_string();
			let parsed: RecordedErrorKind = s.parse().unwrap();
			prop_assert_eq!(kind, parsed);
		}
	}

	#[test]
	fn test_session_id_generate_is_unique() {
		let a = SessionId::generate();
		let b = SessionId::generate();
		assert_ne!(a, b);
		assert!(!a.is_empty());
	}

	#[test]
	fn test_new_session_defaults() {
		let session = Session::new(
			SessionId::new("session_1"),
			None,
			"media_1",
			SessionContext::default(),
		);

		assert_eq!(session.user_id, ANONYMOUS_USER);
		assert_eq!(session.status, SessionStatus::Active);
		assert_eq!(session.qoe_score, 100);
		assert_eq!(session.device_class, DeviceClass::Desktop);
		assert_eq!(session.network_class, NetworkClass::Unknown);
		assert!(session.ended_at.is_none());
		assert!(!session.is_finalized());
	}

	#[test]
	fn test_recorded_counters_track_arrays() {
		let mut session = Session::new(
			SessionId::new("session_1"),
			Some("user_1".to_string()),
			"media_1",
			SessionContext::default(),
		);

		session.add_recorded_error(RecordedError {
			kind: RecordedErrorKind::NetworkError,
			message: Some("connection lost".to_string()),
			code: None,
			at_position: Some(12.0),
			severity: Severity::Critical,
			occurred_at: Utc::now(),
		});
		session.add_recorded_crash(RecordedCrash::new("javascript_error", None));
		session.add_recorded_crash(RecordedCrash::new("cross_origin_error", None));

		assert_eq!(session.recorded_error_count, 1);
		assert_eq!(session.recorded_crash_count, 2);
		assert_eq!(session.total_recorded_issues(), 3);
	}

	#[test]
	fn test_crash_defaults_to_critical() {
		let crash = RecordedCrash::new("javascript_error", Some("boom".to_string()));
		assert_eq!(crash.severity, Severity::Critical);
	}

	#[test]
	fn test_network_class_serde_names() {
		let json = serde_json::to_string(&NetworkClass::FourG).unwrap();
		assert_eq!(json, "\"4g\"");
		let parsed: NetworkClass = serde_json::from_str("\"wifi\"").unwrap();
		assert_eq!(parsed, NetworkClass::Wifi);
	}
}
