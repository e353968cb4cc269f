// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Windowed analytics handler.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::instrument;

use crate::api::AnalyticsQuery;
use crate::handlers::{bad_request, internal_error};
use crate::report::{DateRange, ReportBuilder};
use crate::repository::{QoeRepository, SessionWindow};
use crate::routes::QoeState;

/// Sessions folded per repository read. Large windows take several reads
/// instead of one unbounded scan.
const PAGE_SIZE: u32 = 500;

fn parse_date(value: &str) -> Result<NaiveDate, ()> {
	NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ())
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
	date.and_hms_opt(0, 0, 0)
		.expect("midnight exists for every date")
		.and_utc()
}

/// `GET /analytics?startDate&endDate&mediaId` - aggregates finalized
/// sessions in the window. Unparseable dates are a 400; an empty or
/// inverted window yields a fully-shaped zero report.
#[instrument(skip(state, query))]
pub async fn get_analytics<R: QoeRepository>(
	State(state): State<Arc<QoeState<R>>>,
	Query(query): Query<AnalyticsQuery>,
) -> impl IntoResponse {
	let start_date = match query.start_date.as_deref().map(parse_date).transpose() {
		Ok(date) => date,
		Err(()) => {
			return bad_request("invalid_date", "startDate must be a YYYY-MM-DD calendar date")
				.into_response()
		}
	};
	let end_date = match query.end_date.as_deref().map(parse_date).transpose() {
		Ok(date) => date,
		Err(()) => {
			return bad_request("invalid_date", "endDate must be a YYYY-MM-DD calendar date")
				.into_response()
		}
	};

	let window = SessionWindow {
		start: start_date.map(start_of_day),
		// End of day, expressed as an exclusive bound at the next midnight.
		end: end_date
			.and_then(|d| d.checked_add_days(Days::new(1)))
			.map(start_of_day),
		media_id: query.media_id.clone(),
	};

	let mut builder = ReportBuilder::new();
	let mut offset = 0u32;
	loop {
		let page = match state
			.repository
			.list_finalized_sessions(&window, PAGE_SIZE, offset)
			.await
		{
			Ok(page) => page,
			Err(e) => {
				tracing::error!(error = %e, "Failed to scan sessions for analytics");
				return internal_error("Failed to generate analytics").into_response();
			}
		};
		let page_len = page.len();
		for session in &page {
			builder.fold(session);
		}
		if page_len < PAGE_SIZE as usize {
			break;
		}
		offset += PAGE_SIZE;
	}

	match state.repository.recorded_kind_frequencies(&window).await {
		Ok(frequencies) => builder.set_recorded_kind_frequencies(frequencies),
		Err(e) => {
			tracing::error!(error = %e, "Failed to count recorded error kinds");
			return internal_error("Failed to generate analytics").into_response();
		}
	}

	let report = builder.finish(DateRange {
		start_date: query.start_date,
		end_date: query.end_date,
	});

	tracing::debug!(sessions = report.total_sessions, "Analytics report generated");
	(StatusCode::OK, Json(report)).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_date_accepts_calendar_dates() {
		assert!(parse_date("2026-08-07").is_ok());
		assert!(parse_date("2026-02-29").is_err());
		assert!(parse_date("08/07/2026").is_err());
		assert!(parse_date("not-a-date").is_err());
		assert!(parse_date("").is_err());
	}

	#[test]
	fn test_window_end_is_exclusive_next_midnight() {
		let date = parse_date("2026-08-07").unwrap();
		let end = date.checked_add_days(Days::new(1)).map(start_of_day).unwrap();
		assert_eq!(end.to_rfc3339(), "2026-08-08T00:00:00+00:00");
	}
}
