// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire-level request and response types for the QoE endpoints.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_qoe_core::{
	BufferingInterval, DeviceClass, NetworkClass, PlaybackErrorRecord, QualityShift,
	RecordedCrash, RecordedError, Session, SessionStatus,
};

/// Error body returned by every endpoint on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

/// Device context in a session-start request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfoRequest {
	#[serde(rename = "type", default)]
	pub device_class: DeviceClass,
	#[serde(default)]
	pub os: Option<String>,
	#[serde(rename = "appVersion", default)]
	pub app_version: Option<String>,
}

/// Body of `POST /session/start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
	pub session_id: String,
	#[serde(default)]
	pub user_id: Option<String>,
	pub media_id: String,
	#[serde(default)]
	pub media_title: Option<String>,
	#[serde(default)]
	pub device_info: DeviceInfoRequest,
	#[serde(default)]
	pub network_type: Option<NetworkClass>,
	#[serde(default)]
	pub endpoint_info: HashMap<String, serde_json::Value>,
}

/// Body of `POST /session/{id}/event`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
	#[serde(default)]
	pub user_id: Option<String>,
	pub media_id: String,
	pub event_type: String,
	#[serde(default)]
	pub event_data: serde_json::Value,
}

/// Body of `POST /session/{id}/end`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
	#[serde(default)]
	pub total_watch_duration: i64,
	pub completed_percentage: f64,
	#[serde(default)]
	pub last_playback_position: f64,
	#[serde(default)]
	pub buffering_events: Vec<BufferingInterval>,
	#[serde(default)]
	pub quality_changes: Vec<QualityShift>,
	#[serde(default)]
	pub playback_errors: Vec<PlaybackErrorRecord>,
	#[serde(default)]
	pub final_quality: Option<String>,
}

/// A stored event, echoed back on successful recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
	pub id: String,
	pub session_id: String,
	pub event_type: String,
	pub timestamp: DateTime<Utc>,
}

/// The full session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
	pub session_id: String,
	pub user_id: String,
	pub media_id: String,
	pub media_title: Option<String>,
	pub device_type: DeviceClass,
	pub os_info: Option<String>,
	pub app_version: Option<String>,
	pub network_type: NetworkClass,
	pub user_agent: Option<String>,
	pub endpoint_info: HashMap<String, serde_json::Value>,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
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
	pub recorded_errors: Vec<RecordedError>,
	pub recorded_error_count: u32,
	pub recorded_crashes: Vec<RecordedCrash>,
	pub recorded_crash_count: u32,
	pub qoe_score: u8,
	pub status: SessionStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
	fn from(session: Session) -> Self {
		Self {
			session_id: session.session_id.0,
			user_id: session.user_id,
			media_id: session.media_id,
			media_title: session.media_title,
			device_type: session.device_class,
			os_info: session.os_info,
			app_version: session.app_version,
			network_type: session.network_class,
			user_agent: session.user_agent,
			endpoint_info: session.endpoint_info,
			started_at: session.started_at,
			ended_at: session.ended_at,
			total_session_duration: session.total_session_duration,
			total_watch_duration: session.total_watch_duration,
			completed_percentage: session.completed_percentage,
			last_playback_position: session.last_playback_position,
			buffering_events: session.buffering_events,
			total_buffering_time: session.total_buffering_time,
			total_buffering_count: session.total_buffering_count,
			buffering_percentage: session.buffering_percentage,
			quality_changes: session.quality_changes,
			total_quality_changes: session.total_quality_changes,
			final_quality: session.final_quality,
			playback_errors: session.playback_errors,
			total_errors: session.total_errors,
			error_rate: session.error_rate,
			recorded_errors: session.recorded_errors,
			recorded_error_count: session.recorded_error_count,
			recorded_crashes: session.recorded_crashes,
			recorded_crash_count: session.recorded_crash_count,
			qoe_score: session.qoe_score,
			status: session.status,
			created_at: session.created_at,
			updated_at: session.updated_at,
		}
	}
}

/// Query string of `GET /analytics`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
	#[serde(default)]
	pub start_date: Option<String>,
	#[serde(default)]
	pub end_date: Option<String>,
	#[serde(default)]
	pub media_id: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_qoe_core::{SessionContext, SessionId};

	#[test]
	fn test_start_request_accepts_minimal_body() {
		let body = serde_json::json!({
			"sessionId": "session_1",
			"mediaId": "media_1",
		});
		let parsed: StartSessionRequest = serde_json::from_value(body).unwrap();
		assert_eq!(parsed.session_id, "session_1");
		assert!(parsed.user_id.is_none());
		assert_eq!(parsed.device_info.device_class, DeviceClass::Desktop);
		assert!(parsed.network_type.is_none());
	}

	#[test]
	fn test_session_response_wire_names() {
		let session = Session::new(
			SessionId::new("session_1"),
			Some("user_1".to_string()),
			"media_1",
			SessionContext::default(),
		);
		let json = serde_json::to_value(SessionResponse::from(session)).unwrap();

		assert_eq!(json["sessionId"], "session_1");
		assert_eq!(json["qoeScore"], 100);
		assert_eq!(json["status"], "active");
		assert_eq!(json["deviceType"], "desktop");
		assert_eq!(json["networkType"], "unknown");
		assert!(json["endedAt"].is_null());
	}

	#[test]
	fn test_end_request_defaults() {
		let body = serde_json::json!({ "completedPercentage": 42.0 });
		let parsed: EndSessionRequest = serde_json::from_value(body).unwrap();
		assert_eq!(parsed.completed_percentage, 42.0);
		assert!(parsed.buffering_events.is_empty());
		assert_eq!(parsed.total_watch_duration, 0);
	}
}
