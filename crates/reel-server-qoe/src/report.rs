// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Aggregation engine: time-windowed analytics over finalized sessions.
//!
//! The builder folds sessions one page at a time, so a large window never
//! needs a single unbounded read. Every ratio and average in the finished
//! report defaults to 0 when its denominator is 0 - an empty window yields a
//! fully-shaped zero report, never an error.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reel_qoe_core::{round2, Session};

/// Echo of the requested window bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
	pub start_date: Option<String>,
	pub end_date: Option<String>,
}

/// Per-user rollup, sorted most recently active first in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRollup {
	pub user_id: String,
	pub session_count: u64,
	pub device_classes: Vec<String>,
	pub avg_qoe_score: f64,
	pub last_active: DateTime<Utc>,
	pub total_watch_time: i64,
}

/// Per-media rollup, sorted by play count descending in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRollup {
	pub media_id: String,
	pub play_count: u64,
	pub avg_watch_duration: f64,
	/// Playback errors per play.
	pub error_rate: f64,
	pub avg_qoe_score: f64,
}

/// The windowed analytics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
	pub date_range: DateRange,
	pub total_sessions: u64,
	pub total_buffering_events: u64,
	pub total_buffering_time: f64,
	pub buffering_percentage: f64,
	pub total_errors: u64,
	pub error_percentage: f64,
	pub recorded_errors: u64,
	pub recorded_crashes: u64,
	pub user_count: u64,
	pub media_count: u64,
	pub total_quality_changes: u64,
	pub avg_watch_duration: f64,
	pub device_breakdown: HashMap<String, u64>,
	pub network_breakdown: HashMap<String, u64>,
	pub user_breakdown: Vec<UserRollup>,
	pub media_breakdown: Vec<MediaRollup>,
	pub top_error_messages: HashMap<String, u64>,
	pub top_error_types: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct UserAccumulator {
	session_count: u64,
	device_classes: HashSet<String>,
	qoe_total: u64,
	last_active: Option<DateTime<Utc>>,
	total_watch_time: i64,
}

#[derive(Debug, Default)]
struct MediaAccumulator {
	play_count: u64,
	watch_total: i64,
	error_total: u64,
	qoe_total: u64,
}

/// Streaming accumulator for [`AnalyticsReport`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
	total_sessions: u64,
	total_buffering_events: u64,
	total_buffering_time: f64,
	total_errors: u64,
	total_session_duration: i64,
	total_quality_changes: u64,
	total_watch_duration: i64,
	recorded_errors: u64,
	recorded_crashes: u64,
	users: HashMap<String, UserAccumulator>,
	media: HashMap<String, MediaAccumulator>,
	device_breakdown: HashMap<String, u64>,
	network_breakdown: HashMap<String, u64>,
	error_messages: HashMap<String, u64>,
	recorded_kinds: HashMap<String, u64>,
}

impl ReportBuilder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Folds one finalized session into the accumulator.
	pub fn fold(&mut self, session: &Session) {
		self.total_sessions += 1;
		self.total_buffering_events += u64::from(session.total_buffering_count);
		self.total_buffering_time += session.total_buffering_time;
		self.total_errors += u64::from(session.total_errors);
		self.total_session_duration += session.total_session_duration.unwrap_or(0);
		self.total_quality_changes += u64::from(session.total_quality_changes);
		self.total_watch_duration += session.total_watch_duration;
		self.recorded_errors += u64::from(session.recorded_error_count);
		self.recorded_crashes += u64::from(session.recorded_crash_count);

		*self
			.device_breakdown
			.entry(session.device_class.to_string())
			.or_insert(0) += 1;
		*self
			.network_breakdown
			.entry(session.network_class.to_string())
			.or_insert(0) += 1;

		let last_seen = session.ended_at.unwrap_or(session.started_at);
		let user = self.users.entry(session.user_id.clone()).or_default();
		user.session_count += 1;
		user.device_classes.insert(session.device_class.to_string());
		user.qoe_total += u64::from(session.qoe_score);
		user.total_watch_time += session.total_watch_duration;
		user.last_active = Some(match user.last_active {
			Some(existing) if existing > last_seen => existing,
			_ => last_seen,
		});

		let media = self.media.entry(session.media_id.clone()).or_default();
		media.play_count += 1;
		media.watch_total += session.total_watch_duration;
		media.error_total += u64::from(session.total_errors);
		media.qoe_total += u64::from(session.qoe_score);

		for error in &session.playback_errors {
			*self.error_messages.entry(error.message.clone()).or_insert(0) += 1;
		}
	}

	/// Sets the recorded-error/crash kind frequency table, computed by the
	/// repository over the same window.
	pub fn set_recorded_kind_frequencies(&mut self, frequencies: HashMap<String, u64>) {
		self.recorded_kinds = frequencies;
	}

	/// Finishes the accumulation into a fully-shaped report.
	#[must_use]
	pub fn finish(self, date_range: DateRange) -> AnalyticsReport {
		let buffering_percentage = if self.total_session_duration > 0 {
			round2(self.total_buffering_time / self.total_session_duration as f64 * 100.0)
		} else {
			0.0
		};
		let error_percentage = if self.total_session_duration > 0 {
			round2(self.total_errors as f64 / self.total_session_duration as f64 * 100.0)
		} else {
			0.0
		};
		let avg_watch_duration = if self.total_sessions > 0 {
			round2(self.total_watch_duration as f64 / self.total_sessions as f64)
		} else {
			0.0
		};

		let user_count = self.users.len() as u64;
		let media_count = self.media.len() as u64;

		let mut user_breakdown: Vec<UserRollup> = self
			.users
			.into_iter()
			.map(|(user_id, acc)| {
				let mut device_classes: Vec<String> = acc.device_classes.into_iter().collect();
				device_classes.sort();
				UserRollup {
					user_id,
					session_count: acc.session_count,
					device_classes,
					avg_qoe_score: if acc.session_count > 0 {
						round2(acc.qoe_total as f64 / acc.session_count as f64)
					} else {
						0.0
					},
					last_active: acc.last_active.unwrap_or_else(Utc::now),
					total_watch_time: acc.total_watch_time,
				}
			})
			.collect();
		user_breakdown.sort_by(|a, b| b.last_active.cmp(&a.last_active));

		let mut media_breakdown: Vec<MediaRollup> = self
			.media
			.into_iter()
			.map(|(media_id, acc)| MediaRollup {
				media_id,
				play_count: acc.play_count,
				avg_watch_duration: if acc.play_count > 0 {
					round2(acc.watch_total as f64 / acc.play_count as f64)
				} else {
					0.0
				},
				error_rate: if acc.play_count > 0 {
					round2(acc.error_total as f64 / acc.play_count as f64)
				} else {
					0.0
				},
				avg_qoe_score: if acc.play_count > 0 {
					round2(acc.qoe_total as f64 / acc.play_count as f64)
				} else {
					0.0
				},
			})
			.collect();
		media_breakdown.sort_by(|a, b| b.play_count.cmp(&a.play_count));

		AnalyticsReport {
			date_range,
			total_sessions: self.total_sessions,
			total_buffering_events: self.total_buffering_events,
			total_buffering_time: round2(self.total_buffering_time),
			buffering_percentage,
			total_errors: self.total_errors,
			error_percentage,
			recorded_errors: self.recorded_errors,
			recorded_crashes: self.recorded_crashes,
			user_count,
			media_count,
			total_quality_changes: self.total_quality_changes,
			avg_watch_duration,
			device_breakdown: self.device_breakdown,
			network_breakdown: self.network_breakdown,
			user_breakdown,
			media_breakdown,
			top_error_messages: self.error_messages,
			top_error_types: self.recorded_kinds,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use reel_qoe_core::{
		DeviceClass, NetworkClass, PlaybackErrorRecord, SessionContext, SessionId, SessionStatus,
	};

	fn finalized_session(
		id: &str,
		user_id: &str,
		media_id: &str,
		device_class: DeviceClass,
		qoe_score: u8,
	) -> Session {
		let mut session = Session::new(
			SessionId::new(id),
			Some(user_id.to_string()),
			media_id,
			SessionContext {
				device_class,
				network_class: NetworkClass::Wifi,
				..SessionContext::default()
			},
		);
		session.status = SessionStatus::Completed;
		session.total_session_duration = Some(100);
		session.total_watch_duration = 80;
		session.total_buffering_count = 2;
		session.total_buffering_time = 5.0;
		session.total_errors = 1;
		session.total_quality_changes = 2;
		session.qoe_score = qoe_score;
		session.ended_at = Some(session.started_at + Duration::seconds(100));
		session.playback_errors = vec![PlaybackErrorRecord {
			code: "5".to_string(),
			message: "HTML5 Player Error".to_string(),
			at_position: 10.0,
			occurred_at: session.started_at,
		}];
		session
	}

	#[test]
	fn empty_window_yields_zero_report() {
		let report = ReportBuilder::new().finish(DateRange::default());

		assert_eq!(report.total_sessions, 0);
		assert_eq!(report.buffering_percentage, 0.0);
		assert_eq!(report.error_percentage, 0.0);
		assert_eq!(report.avg_watch_duration, 0.0);
		assert_eq!(report.user_count, 0);
		assert_eq!(report.media_count, 0);
		assert!(report.device_breakdown.is_empty());
		assert!(report.user_breakdown.is_empty());
		assert!(report.media_breakdown.is_empty());
	}

	#[test]
	fn zero_report_serializes_without_nulls() {
		let report = ReportBuilder::new().finish(DateRange::default());
		let json = serde_json::to_value(&report).unwrap();

		assert_eq!(json["totalSessions"], 0);
		assert_eq!(json["bufferingPercentage"], 0.0);
		assert_eq!(json["avgWatchDuration"], 0.0);
		assert!(json["deviceBreakdown"].as_object().unwrap().is_empty());
		assert!(json["userBreakdown"].as_array().unwrap().is_empty());
	}

	#[test]
	fn fold_accumulates_totals_and_breakdowns() {
		let mut builder = ReportBuilder::new();
		builder.fold(&finalized_session(
			"s1",
			"user_1",
			"media_1",
			DeviceClass::Desktop,
			90,
		));
		builder.fold(&finalized_session(
			"s2",
			"user_2",
			"media_1",
			DeviceClass::Mobile,
			70,
		));

		let report = builder.finish(DateRange::default());
		assert_eq!(report.total_sessions, 2);
		assert_eq!(report.total_buffering_events, 4);
		assert_eq!(report.total_buffering_time, 10.0);
		// 10s buffering over 200s of sessions.
		assert_eq!(report.buffering_percentage, 5.0);
		// 2 errors over 200s.
		assert_eq!(report.error_percentage, 1.0);
		assert_eq!(report.user_count, 2);
		assert_eq!(report.media_count, 1);
		assert_eq!(report.avg_watch_duration, 80.0);
		assert_eq!(report.device_breakdown.get("desktop"), Some(&1));
		assert_eq!(report.device_breakdown.get("mobile"), Some(&1));
		assert_eq!(report.network_breakdown.get("wifi"), Some(&2));
		assert_eq!(
			report.top_error_messages.get("HTML5 Player Error"),
			Some(&2)
		);
	}

	#[test]
	fn user_rollups_sort_by_most_recent_activity() {
		let mut builder = ReportBuilder::new();

		let mut old = finalized_session("s1", "user_old", "media_1", DeviceClass::Desktop, 90);
		old.ended_at = Some(Utc::now() - Duration::days(30));
		builder.fold(&old);

		let mut recent = finalized_session("s2", "user_recent", "media_1", DeviceClass::Mobile, 80);
		recent.ended_at = Some(Utc::now());
		builder.fold(&recent);

		let report = builder.finish(DateRange::default());
		assert_eq!(report.user_breakdown[0].user_id, "user_recent");
		assert_eq!(report.user_breakdown[1].user_id, "user_old");
	}

	#[test]
	fn user_rollup_tracks_distinct_devices_and_average_score() {
		let mut builder = ReportBuilder::new();
		builder.fold(&finalized_session(
			"s1",
			"user_1",
			"media_1",
			DeviceClass::Desktop,
			90,
		));
		builder.fold(&finalized_session(
			"s2",
			"user_1",
			"media_2",
			DeviceClass::Mobile,
			70,
		));
		builder.fold(&finalized_session(
			"s3",
			"user_1",
			"media_1",
			DeviceClass::Mobile,
			80,
		));

		let report = builder.finish(DateRange::default());
		let user = &report.user_breakdown[0];
		assert_eq!(user.session_count, 3);
		assert_eq!(user.device_classes, vec!["desktop", "mobile"]);
		assert_eq!(user.avg_qoe_score, 80.0);
		assert_eq!(user.total_watch_time, 240);
	}

	#[test]
	fn media_rollups_sort_by_play_count() {
		let mut builder = ReportBuilder::new();
		for i in 0..3 {
			builder.fold(&finalized_session(
				&format!("p{i}"),
				"user_1",
				"media_popular",
				DeviceClass::Desktop,
				90,
			));
		}
		builder.fold(&finalized_session(
			"q1",
			"user_1",
			"media_niche",
			DeviceClass::Desktop,
			90,
		));

		let report = builder.finish(DateRange::default());
		assert_eq!(report.media_breakdown[0].media_id, "media_popular");
		assert_eq!(report.media_breakdown[0].play_count, 3);
		// One playback error per folded session.
		assert_eq!(report.media_breakdown[0].error_rate, 1.0);
		assert_eq!(report.media_breakdown[1].media_id, "media_niche");
	}

	#[test]
	fn recorded_kind_frequencies_pass_through() {
		let mut builder = ReportBuilder::new();
		builder.set_recorded_kind_frequencies(HashMap::from([
			("network_error".to_string(), 3),
			("javascript_error".to_string(), 1),
		]));

		let report = builder.finish(DateRange::default());
		assert_eq!(report.top_error_types.get("network_error"), Some(&3));
		assert_eq!(report.top_error_types.get("javascript_error"), Some(&1));
	}

	#[test]
	fn date_range_is_echoed() {
		let report = ReportBuilder::new().finish(DateRange {
			start_date: Some("2026-08-01".to_string()),
			end_date: Some("2026-08-07".to_string()),
		});
		assert_eq!(report.date_range.start_date.as_deref(), Some("2026-08-01"));
		assert_eq!(report.date_range.end_date.as_deref(), Some("2026-08-07"));
	}
}
