// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types and HTTP transport to the collecting service.

use std::collections::HashMap;
use std::time::Duration;

use reel_common_http::RetryConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use reel_qoe_core::{
	BufferingInterval, DeviceClass, EventPayload, EventType, NetworkClass, PlaybackErrorRecord,
	QualityShift, SessionId, SessionStatus,
};

use crate::error::{QoeSdkError, Result};

/// Device context submitted at session start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
	#[serde(rename = "type")]
	pub device_class: DeviceClass,
	pub os: Option<String>,
	#[serde(rename = "appVersion")]
	pub app_version: Option<String>,
}

/// Body of `POST /api/qoe/session/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
	pub session_id: SessionId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	pub media_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub media_title: Option<String>,
	pub device_info: DeviceInfo,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub network_type: Option<NetworkClass>,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub endpoint_info: HashMap<String, serde_json::Value>,
}

/// Body of `POST /api/qoe/session/{id}/event`. Also the unit spooled by the
/// offline delivery queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
	pub user_id: String,
	pub media_id: String,
	pub event_type: EventType,
	pub event_data: EventPayload,
}

/// Body of `POST /api/qoe/session/{id}/end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
	pub total_watch_duration: i64,
	pub completed_percentage: f64,
	pub last_playback_position: f64,
	pub buffering_events: Vec<BufferingInterval>,
	pub quality_changes: Vec<QualityShift>,
	pub playback_errors: Vec<PlaybackErrorRecord>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub final_quality: Option<String>,
}

/// The slice of the finalized session the SDK reports back to its caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedSession {
	pub qoe_score: u8,
	pub status: SessionStatus,
	pub total_session_duration: Option<i64>,
	pub buffering_percentage: f64,
	pub error_rate: f64,
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
	#[allow(dead_code)]
	error: String,
	message: String,
}

/// HTTP transport to the collecting service.
#[derive(Debug)]
pub struct Transport {
	http: Client,
	base_url: String,
	retry_config: RetryConfig,
	event_send_timeout: Duration,
	user_agent_override: Option<String>,
}

impl Transport {
	pub(crate) fn new(
		http: Client,
		base_url: String,
		retry_config: RetryConfig,
		event_send_timeout: Duration,
		user_agent_override: Option<String>,
	) -> Self {
		Self {
			http,
			base_url,
			retry_config,
			event_send_timeout,
			user_agent_override,
		}
	}

	pub(crate) async fn start_session(&self, request: &StartSessionRequest) -> Result<()> {
		let url = format!("{}/api/qoe/session/start", self.base_url);
		debug!(url = %url, session_id = %request.session_id, "Starting session");

		let response = reel_common_http::retry(&self.retry_config, || async {
			let mut builder = self.http.post(&url).json(request);
			if let Some(ua) = &self.user_agent_override {
				builder = builder.header(reqwest::header::USER_AGENT, ua.as_str());
			}
			builder.send().await
		})
		.await?;

		Self::check_status(response).await.map(|_| ())
	}

	/// One delivery attempt with a short timeout. Failures are the offline
	/// queue's problem, not the caller's.
	pub(crate) async fn send_event(
		&self,
		session_id: &SessionId,
		envelope: &EventEnvelope,
	) -> Result<()> {
		let url = format!("{}/api/qoe/session/{}/event", self.base_url, session_id);

		let response = self
			.http
			.post(&url)
			.timeout(self.event_send_timeout)
			.json(envelope)
			.send()
			.await?;

		Self::check_status(response).await.map(|_| ())
	}

	pub(crate) async fn end_session(
		&self,
		session_id: &SessionId,
		request: &EndSessionRequest,
	) -> Result<FinalizedSession> {
		let url = format!("{}/api/qoe/session/{}/end", self.base_url, session_id);
		debug!(url = %url, session_id = %session_id, "Ending session");

		let response = reel_common_http::retry(&self.retry_config, || async {
			self.http.post(&url).json(request).send().await
		})
		.await?;

		let response = Self::check_status(response).await?;
		Ok(response.json::<FinalizedSession>().await?)
	}

	async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
		if response.status().is_success() {
			return Ok(response);
		}
		let status = response.status().as_u16();
		let message = match response.json::<ServerErrorBody>().await {
			Ok(body) => body.message,
			Err(_) => String::new(),
		};
		Err(QoeSdkError::ServerError { status, message })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_start_request_wire_shape() {
		let request = StartSessionRequest {
			session_id: SessionId::new("session_1"),
			user_id: Some("user_1".to_string()),
			media_id: "media_1".to_string(),
			media_title: Some("Title".to_string()),
			device_info: DeviceInfo {
				device_class: DeviceClass::Mobile,
				os: Some("Android".to_string()),
				app_version: Some("Chrome 120".to_string()),
			},
			network_type: Some(NetworkClass::FourG),
			endpoint_info: HashMap::new(),
		};

		let json = serde_json::to_value(&request).unwrap();
		assert_eq!(json["sessionId"], "session_1");
		assert_eq!(json["mediaId"], "media_1");
		assert_eq!(json["deviceInfo"]["type"], "mobile");
		assert_eq!(json["deviceInfo"]["appVersion"], "Chrome 120");
		assert_eq!(json["networkType"], "4g");
		assert!(json.get("endpointInfo").is_none());
	}

	#[test]
	fn test_event_envelope_wire_shape() {
		let envelope = EventEnvelope {
			user_id: "user_1".to_string(),
			media_id: "media_1".to_string(),
			event_type: EventType::BufferingEnd,
			event_data: EventPayload::BufferingEnd {
				duration_secs: 2.5,
				quality: Some("hd720".to_string()),
				at_position: 41.0,
			},
		};

		let json = serde_json::to_value(&envelope).unwrap();
		assert_eq!(json["eventType"], "buffering_end");
		assert_eq!(json["eventData"]["duration_secs"], 2.5);
	}

	#[test]
	fn test_finalized_session_parses_server_response() {
		let body = serde_json::json!({
			"sessionId": "session_1",
			"qoeScore": 91,
			"status": "completed",
			"totalSessionDuration": 100,
			"bufferingPercentage": 5.0,
			"errorRate": 1.0,
			"totalWatchDuration": 95,
		});

		let parsed: FinalizedSession = serde_json::from_value(body).unwrap();
		assert_eq!(parsed.qoe_score, 91);
		assert_eq!(parsed.status, SessionStatus::Completed);
		assert_eq!(parsed.total_session_duration, Some(100));
	}
}
