// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Classification of raw player notifications into critical events.
//!
//! The classifier is the only component that decides what is worth
//! persisting. It is synchronous, never touches the network, and produces at
//! most one wire event per notification plus the local records the session
//! accumulates alongside it.

use chrono::{DateTime, Utc};
use tracing::debug;

use reel_qoe_core::{
	round2, BufferingInterval, EventPayload, PlaybackErrorRecord, QualityShift, RecordedCrash,
	RecordedError, RecordedErrorKind, Severity,
};

/// Player state as reported by the underlying media player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
	Unstarted,
	Ended,
	Playing,
	Paused,
	Buffering,
	Cued,
}

/// A raw notification from the player or its host environment.
#[derive(Debug, Clone)]
pub enum PlayerNotification {
	/// The player moved to a new state.
	StateChange { state: PlayerState, position: f64 },
	/// The player switched rendition quality.
	QualityChange { quality: String, position: f64 },
	/// The player reported a playback error by numeric code.
	PlayerError { code: i32, position: f64 },
	/// The media failed to load at all.
	LoadFailure { media_id: String },
	/// The player itself failed to initialize.
	InitFailure { message: String },
	/// An uncaught runtime exception reached the host environment.
	RuntimeException {
		message: String,
		source: Option<String>,
		line: Option<u32>,
		column: Option<u32>,
		stack: Option<String>,
	},
	/// Host connectivity changed.
	ConnectivityChange { online: bool, position: f64 },
}

/// A local record produced as a side effect of classification. The session
/// tracker appends these to its in-memory log.
#[derive(Debug, Clone)]
pub enum LocalRecord {
	/// A buffering interval opened; bump the live stall counter.
	BufferingOpened,
	/// A buffering interval closed with its measured duration.
	BufferingClosed(BufferingInterval),
	QualityShift(QualityShift),
	PlaybackError(PlaybackErrorRecord),
	RecordedError(RecordedError),
	RecordedCrash(RecordedCrash),
}

/// Outcome of classifying one notification.
#[derive(Debug, Default)]
pub struct Classification {
	/// At most one critical event bound for the collecting service.
	pub wire_event: Option<EventPayload>,
	/// Records to append to the session's local arrays.
	pub local: Vec<LocalRecord>,
	/// Connectivity came back; the delivery queue should flush.
	pub connectivity_restored: bool,
}

#[derive(Debug)]
struct OpenInterval {
	wall_start: DateTime<Utc>,
	position: f64,
	quality: Option<String>,
}

/// Stateful classifier for one playback session.
#[derive(Debug, Default)]
pub struct EventClassifier {
	open_buffering: Option<OpenInterval>,
	last_quality: Option<String>,
	user_agent: Option<String>,
}

impl EventClassifier {
	#[must_use]
	pub fn new(user_agent: Option<String>) -> Self {
		Self {
			open_buffering: None,
			last_quality: None,
			user_agent,
		}
	}

	/// The most recently observed quality, used as the session's final
	/// quality at end-of-play.
	#[must_use]
	pub fn current_quality(&self) -> Option<&str> {
		self.last_quality.as_deref()
	}

	/// Classifies one notification. Returns nothing for non-critical
	/// notifications; never blocks.
	pub fn classify(&mut self, notification: PlayerNotification) -> Classification {
		match notification {
			PlayerNotification::StateChange { state, position } => {
				self.classify_state_change(state, position)
			}
			PlayerNotification::QualityChange { quality, position } => {
				self.classify_quality_change(quality, position)
			}
			PlayerNotification::PlayerError { code, position } => {
				self.classify_player_error(code, position)
			}
			PlayerNotification::LoadFailure { media_id } => self.classify_load_failure(&media_id),
			PlayerNotification::InitFailure { message } => self.classify_init_failure(&message),
			PlayerNotification::RuntimeException {
				message,
				source,
				line,
				column,
				stack,
			} => self.classify_runtime_exception(message, source, line, column, stack),
			PlayerNotification::ConnectivityChange { online, position } => {
				self.classify_connectivity(online, position)
			}
		}
	}

	fn classify_state_change(&mut self, state: PlayerState, position: f64) -> Classification {
		match state {
			PlayerState::Buffering => {
				// Opening emits no wire event; the live counter reacts
				// immediately, the terminal event carries the duration.
				if self.open_buffering.is_none() {
					self.open_buffering = Some(OpenInterval {
						wall_start: Utc::now(),
						position,
						quality: self.last_quality.clone(),
					});
				}
				Classification {
					local: vec![LocalRecord::BufferingOpened],
					..Classification::default()
				}
			}
			PlayerState::Playing => {
				let Some(open) = self.open_buffering.take() else {
					return Classification::default();
				};
				let duration_secs = round2(
					(Utc::now() - open.wall_start).num_milliseconds() as f64 / 1000.0,
				);
				debug!(duration_secs, "Buffering interval closed");
				let interval = BufferingInterval {
					start_position: open.position,
					end_position: position,
					duration_secs,
					quality: open.quality.clone(),
					started_at: open.wall_start,
				};
				Classification {
					wire_event: Some(EventPayload::BufferingEnd {
						duration_secs,
						quality: open.quality,
						at_position: position,
					}),
					local: vec![LocalRecord::BufferingClosed(interval)],
					connectivity_restored: false,
				}
			}
			_ => Classification::default(),
		}
	}

	fn classify_quality_change(&mut self, quality: String, position: f64) -> Classification {
		// The first observation seeds state silently; a "change" needs a
		// prior value to compare against.
		let previous = self.last_quality.replace(quality.clone());
		let Some(from_quality) = previous else {
			return Classification::default();
		};

		let shift = QualityShift {
			from_quality: from_quality.clone(),
			to_quality: quality.clone(),
			at_position: position,
			occurred_at: Utc::now(),
		};
		Classification {
			wire_event: Some(EventPayload::QualityChange {
				from_quality,
				to_quality: quality,
				at_position: position,
			}),
			local: vec![LocalRecord::QualityShift(shift)],
			connectivity_restored: false,
		}
	}

	fn classify_player_error(&mut self, code: i32, position: f64) -> Classification {
		let message = player_error_message(code);
		let record = PlaybackErrorRecord {
			code: code.to_string(),
			message: message.clone(),
			at_position: position,
			occurred_at: Utc::now(),
		};
		Classification {
			wire_event: Some(EventPayload::Error {
				code: code.to_string(),
				message,
				at_position: position,
				kind: RecordedErrorKind::PlaybackError,
				severity: Severity::Critical,
			}),
			local: vec![LocalRecord::PlaybackError(record)],
			connectivity_restored: false,
		}
	}

	fn classify_load_failure(&mut self, media_id: &str) -> Classification {
		let message = format!("Media failed to load - possibly invalid ID: {media_id}");
		self.error_with_recorded(
			"LOADING_FAILED",
			message,
			0.0,
			RecordedErrorKind::LoadingError,
		)
	}

	fn classify_init_failure(&mut self, message: &str) -> Classification {
		let message = format!("Player initialization failed: {message}");
		self.error_with_recorded(
			"INIT_FAILED",
			message,
			0.0,
			RecordedErrorKind::InitializationError,
		)
	}

	fn classify_runtime_exception(
		&mut self,
		message: String,
		source: Option<String>,
		line: Option<u32>,
		column: Option<u32>,
		stack: Option<String>,
	) -> Classification {
		let kind = classify_exception_message(&message);
		let record = PlaybackErrorRecord {
			code: kind.to_string(),
			message: message.clone(),
			at_position: 0.0,
			occurred_at: Utc::now(),
		};
		let crash = RecordedCrash::new(kind, Some(message.clone()));
		Classification {
			wire_event: Some(EventPayload::Crash {
				kind: kind.to_string(),
				message,
				source,
				line,
				column,
				stack,
				user_agent: self.user_agent.clone(),
				severity: Severity::Critical,
			}),
			local: vec![
				LocalRecord::PlaybackError(record),
				LocalRecord::RecordedCrash(crash),
			],
			connectivity_restored: false,
		}
	}

	fn classify_connectivity(&mut self, online: bool, position: f64) -> Classification {
		if online {
			debug!("Connectivity restored");
			return Classification {
				connectivity_restored: true,
				..Classification::default()
			};
		}
		self.error_with_recorded(
			"NETWORK_OFFLINE",
			"Network connection lost during playback".to_string(),
			position,
			RecordedErrorKind::NetworkError,
		)
	}

	fn error_with_recorded(
		&mut self,
		code: &str,
		message: String,
		position: f64,
		kind: RecordedErrorKind,
	) -> Classification {
		let now = Utc::now();
		let playback = PlaybackErrorRecord {
			code: code.to_string(),
			message: message.clone(),
			at_position: position,
			occurred_at: now,
		};
		let recorded = RecordedError {
			kind,
			message: Some(message.clone()),
			code: Some(code.to_string()),
			at_position: Some(position),
			severity: Severity::Critical,
			occurred_at: now,
		};
		Classification {
			wire_event: Some(EventPayload::Error {
				code: code.to_string(),
				message,
				at_position: position,
				kind,
				severity: Severity::Critical,
			}),
			local: vec![
				LocalRecord::PlaybackError(playback),
				LocalRecord::RecordedError(recorded),
			],
			connectivity_restored: false,
		}
	}
}

/// Fixed mapping from player error codes to human-readable messages.
fn player_error_message(code: i32) -> String {
	match code {
		2 => "Invalid Parameter".to_string(),
		5 => "HTML5 Player Error".to_string(),
		100 => "Video Not Found".to_string(),
		101 | 150 => "Video Not Embeddable".to_string(),
		other => format!("Unknown Error ({other})"),
	}
}

/// Classifies an uncaught exception message into a crash kind.
fn classify_exception_message(message: &str) -> &'static str {
	if message.to_lowercase().contains("invalid video id") {
		"invalid_video_id"
	} else if message.contains("ERR_INTERNET_DISCONNECTED") {
		"network_error"
	} else if message.contains("cross-origin") {
		"cross_origin_error"
	} else {
		"javascript_error"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_qoe_core::EventType;

	fn wire_type(classification: &Classification) -> Option<EventType> {
		classification.wire_event.as_ref().map(|e| e.event_type())
	}

	#[test]
	fn test_buffering_open_emits_no_wire_event() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Buffering,
			position: 10.0,
		});

		assert!(result.wire_event.is_none());
		assert!(matches!(result.local[..], [LocalRecord::BufferingOpened]));
	}

	#[test]
	fn test_buffering_close_carries_duration() {
		let mut classifier = EventClassifier::new(None);
		classifier.classify(PlayerNotification::QualityChange {
			quality: "hd720".to_string(),
			position: 9.0,
		});
		classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Buffering,
			position: 10.0,
		});
		let result = classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Playing,
			position: 10.5,
		});

		match result.wire_event {
			Some(EventPayload::BufferingEnd {
				duration_secs,
				quality,
				at_position,
			}) => {
				assert!(duration_secs >= 0.0);
				assert_eq!(quality.as_deref(), Some("hd720"));
				assert_eq!(at_position, 10.5);
			}
			other => panic!("unexpected wire event: {other:?}"),
		}
		match &result.local[..] {
			[LocalRecord::BufferingClosed(interval)] => {
				assert_eq!(interval.start_position, 10.0);
				assert_eq!(interval.end_position, 10.5);
			}
			other => panic!("unexpected local records: {other:?}"),
		}
	}

	#[test]
	fn test_playing_without_open_interval_is_silent() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Playing,
			position: 5.0,
		});

		assert!(result.wire_event.is_none());
		assert!(result.local.is_empty());
	}

	#[test]
	fn test_pause_is_not_critical() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Paused,
			position: 5.0,
		});

		assert!(result.wire_event.is_none());
		assert!(result.local.is_empty());
	}

	#[test]
	fn test_first_quality_observation_seeds_silently() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::QualityChange {
			quality: "hd1080".to_string(),
			position: 0.0,
		});

		assert!(result.wire_event.is_none());
		assert!(result.local.is_empty());
		assert_eq!(classifier.current_quality(), Some("hd1080"));
	}

	#[test]
	fn test_second_quality_observation_emits_change() {
		let mut classifier = EventClassifier::new(None);
		classifier.classify(PlayerNotification::QualityChange {
			quality: "hd1080".to_string(),
			position: 0.0,
		});
		let result = classifier.classify(PlayerNotification::QualityChange {
			quality: "hd720".to_string(),
			position: 30.0,
		});

		match result.wire_event {
			Some(EventPayload::QualityChange {
				from_quality,
				to_quality,
				at_position,
			}) => {
				assert_eq!(from_quality, "hd1080");
				assert_eq!(to_quality, "hd720");
				assert_eq!(at_position, 30.0);
			}
			other => panic!("unexpected wire event: {other:?}"),
		}
	}

	#[test]
	fn test_player_error_code_table() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::PlayerError {
			code: 100,
			position: 12.0,
		});

		match result.wire_event {
			Some(EventPayload::Error { code, message, .. }) => {
				assert_eq!(code, "100");
				assert_eq!(message, "Video Not Found");
			}
			other => panic!("unexpected wire event: {other:?}"),
		}

		assert_eq!(player_error_message(2), "Invalid Parameter");
		assert_eq!(player_error_message(5), "HTML5 Player Error");
		assert_eq!(player_error_message(101), "Video Not Embeddable");
		assert_eq!(player_error_message(150), "Video Not Embeddable");
		assert_eq!(player_error_message(42), "Unknown Error (42)");
	}

	#[test]
	fn test_exception_message_patterns() {
		assert_eq!(
			classify_exception_message("Invalid Video ID supplied"),
			"invalid_video_id"
		);
		assert_eq!(
			classify_exception_message("net::ERR_INTERNET_DISCONNECTED"),
			"network_error"
		);
		assert_eq!(
			classify_exception_message("Blocked a frame with cross-origin access"),
			"cross_origin_error"
		);
		assert_eq!(
			classify_exception_message("undefined is not a function"),
			"javascript_error"
		);
	}

	#[test]
	fn test_runtime_exception_records_crash() {
		let mut classifier = EventClassifier::new(Some("test-agent/1.0".to_string()));
		let result = classifier.classify(PlayerNotification::RuntimeException {
			message: "undefined is not a function".to_string(),
			source: Some("app.js".to_string()),
			line: Some(10),
			column: Some(4),
			stack: None,
		});

		assert_eq!(wire_type(&result), Some(EventType::Crash));
		match result.wire_event {
			Some(EventPayload::Crash {
				kind,
				user_agent,
				severity,
				..
			}) => {
				assert_eq!(kind, "javascript_error");
				assert_eq!(user_agent.as_deref(), Some("test-agent/1.0"));
				assert_eq!(severity, Severity::Critical);
			}
			other => panic!("unexpected wire event: {other:?}"),
		}
		assert!(result
			.local
			.iter()
			.any(|r| matches!(r, LocalRecord::RecordedCrash(_))));
	}

	#[test]
	fn test_offline_records_network_error() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::ConnectivityChange {
			online: false,
			position: 33.0,
		});

		assert_eq!(wire_type(&result), Some(EventType::Error));
		match &result.local[..] {
			[LocalRecord::PlaybackError(e), LocalRecord::RecordedError(r)] => {
				assert_eq!(e.code, "NETWORK_OFFLINE");
				assert_eq!(r.kind, RecordedErrorKind::NetworkError);
				assert_eq!(r.severity, Severity::Critical);
			}
			other => panic!("unexpected local records: {other:?}"),
		}
	}

	#[test]
	fn test_online_requests_flush_only() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::ConnectivityChange {
			online: true,
			position: 35.0,
		});

		assert!(result.connectivity_restored);
		assert!(result.wire_event.is_none());
		assert!(result.local.is_empty());
	}

	#[test]
	fn test_load_failure_classified_as_loading_error() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::LoadFailure {
			media_id: "bad_id".to_string(),
		});

		match result.wire_event {
			Some(EventPayload::Error { code, kind, .. }) => {
				assert_eq!(code, "LOADING_FAILED");
				assert_eq!(kind, RecordedErrorKind::LoadingError);
			}
			other => panic!("unexpected wire event: {other:?}"),
		}
	}

	#[test]
	fn test_init_failure_classified_as_initialization_error() {
		let mut classifier = EventClassifier::new(None);
		let result = classifier.classify(PlayerNotification::InitFailure {
			message: "no container".to_string(),
		});

		match result.wire_event {
			Some(EventPayload::Error { code, kind, .. }) => {
				assert_eq!(code, "INIT_FAILED");
				assert_eq!(kind, RecordedErrorKind::InitializationError);
			}
			other => panic!("unexpected wire event: {other:?}"),
		}
	}

	#[test]
	fn test_repeated_buffering_keeps_first_interval() {
		let mut classifier = EventClassifier::new(None);
		classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Buffering,
			position: 10.0,
		});
		classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Buffering,
			position: 11.0,
		});
		let result = classifier.classify(PlayerNotification::StateChange {
			state: PlayerState::Playing,
			position: 12.0,
		});

		match &result.local[..] {
			[LocalRecord::BufferingClosed(interval)] => {
				assert_eq!(interval.start_position, 10.0);
			}
			other => panic!("unexpected local records: {other:?}"),
		}
	}
}
