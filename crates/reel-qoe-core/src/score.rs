// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scoring engine and session finalization math.
//!
//! The score maps a finished session's buffering, error, and quality-churn
//! metrics to a 0-100 integer:
//!
//! ```text
//! penalty = min(quality_changes * 3, 10)
//! raw     = 100 - 0.5 * buffering_percentage - 1.0 * error_rate - penalty
//! score   = max(0, round(raw))
//! ```
//!
//! Rounding is to the nearest integer with ties away from zero
//! (`f64::round`). All functions here are pure.

use chrono::{DateTime, Utc};

use crate::session::{
	BufferingInterval, PlaybackErrorRecord, QualityShift, SessionStatus,
};

/// Weight applied to the buffering percentage.
const BUFFERING_WEIGHT: f64 = 0.5;
/// Weight applied to the error rate.
const ERROR_WEIGHT: f64 = 1.0;
/// Penalty per quality change, saturating at [`MAX_QUALITY_PENALTY`].
const QUALITY_CHANGE_PENALTY: f64 = 3.0;
/// Cap on the quality-churn penalty. Some adaptive-bitrate switching is
/// expected, so churn is penalized but not unboundedly.
const MAX_QUALITY_PENALTY: f64 = 10.0;

/// Watch percentage at or above which a session counts as completed.
const COMPLETION_THRESHOLD: f64 = 90.0;

/// Penalty for adaptive-bitrate churn: 3 per change, capped at 10.
#[must_use]
pub fn quality_drop_penalty(quality_change_count: u32) -> f64 {
	if quality_change_count > 3 {
		MAX_QUALITY_PENALTY
	} else {
		f64::from(quality_change_count) * QUALITY_CHANGE_PENALTY
	}
}

/// The QoE score for a finished session, in [0, 100].
#[must_use]
pub fn qoe_score(buffering_percentage: f64, error_rate: f64, quality_change_count: u32) -> u8 {
	let raw = 100.0
		- BUFFERING_WEIGHT * buffering_percentage
		- ERROR_WEIGHT * error_rate
		- quality_drop_penalty(quality_change_count);
	raw.round().max(0.0) as u8
}

/// Interim score shown while playback is still running, driven by the live
/// buffering and error counters rather than finalized percentages.
#[must_use]
pub fn live_score(buffering_count: u32, error_count: u32) -> u8 {
	let raw = 100.0 - f64::from(buffering_count) * 8.0 - f64::from(error_count) * 15.0;
	raw.max(0.0).round() as u8
}

/// Rounds to two decimal places, matching how the collecting service stores
/// percentages and rates.
#[must_use]
pub fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

/// Inputs to session finalization, as submitted by the client at end-of-play.
#[derive(Debug, Clone)]
pub struct FinalizationInput<'a> {
	pub started_at: DateTime<Utc>,
	pub ended_at: DateTime<Utc>,
	pub completed_percentage: f64,
	pub buffering_events: &'a [BufferingInterval],
	pub quality_changes: &'a [QualityShift],
	pub playback_errors: &'a [PlaybackErrorRecord],
}

/// Derived metrics computed exactly once at session finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalMetrics {
	/// Wall-clock session length in whole seconds.
	pub total_session_duration: i64,
	pub total_buffering_time: f64,
	pub total_buffering_count: u32,
	pub buffering_percentage: f64,
	pub total_errors: u32,
	pub error_rate: f64,
	pub total_quality_changes: u32,
	pub qoe_score: u8,
	pub status: SessionStatus,
}

/// Computes all derived metrics for a finished session.
///
/// Percentages and rates fall back to 0 whenever the session duration is
/// zero or negative; they are never NaN.
#[must_use]
pub fn finalize_session(input: &FinalizationInput<'_>) -> FinalMetrics {
	let total_session_duration =
		((input.ended_at - input.started_at).num_milliseconds() as f64 / 1000.0).round() as i64;

	let total_buffering_time = round2(
		input
			.buffering_events
			.iter()
			.map(|e| e.duration_secs)
			.sum(),
	);
	let total_buffering_count = input.buffering_events.len() as u32;
	let buffering_percentage = if total_session_duration > 0 {
		round2(total_buffering_time / total_session_duration as f64 * 100.0)
	} else {
		0.0
	};

	let total_errors = input.playback_errors.len() as u32;
	let error_rate = if total_session_duration > 0 {
		round2(f64::from(total_errors) / total_session_duration as f64 * 100.0)
	} else {
		0.0
	};

	let total_quality_changes = input.quality_changes.len() as u32;
	let qoe_score = qoe_score(buffering_percentage, error_rate, total_quality_changes);

	let status = if input.completed_percentage >= COMPLETION_THRESHOLD {
		SessionStatus::Completed
	} else {
		SessionStatus::Abandoned
	};

	FinalMetrics {
		total_session_duration,
		total_buffering_time,
		total_buffering_count,
		buffering_percentage,
		total_errors,
		error_rate,
		total_quality_changes,
		qoe_score,
		status,
	}
}
