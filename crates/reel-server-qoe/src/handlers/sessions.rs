// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session lifecycle handlers: start, record event, end, fetch.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use tracing::instrument;

use reel_qoe_core::{
	finalize_session, EventPayload, EventType, FinalizationInput, QoeEvent, RecordedCrash,
	RecordedError, Session, SessionContext, SessionId, ANONYMOUS_USER,
};

use crate::api::{
	EndSessionRequest, EventResponse, RecordEventRequest, SessionResponse, StartSessionRequest,
};
use crate::error::QoeServerError;
use crate::handlers::{bad_request, internal_error, not_found};
use crate::repository::{QoeRepository, SessionFinalization};
use crate::routes::QoeState;

fn effective_user(user_id: Option<String>) -> String {
	user_id
		.filter(|u| !u.is_empty())
		.unwrap_or_else(|| ANONYMOUS_USER.to_string())
}

fn request_user_agent(headers: &HeaderMap) -> Option<String> {
	headers
		.get(header::USER_AGENT)
		.and_then(|v| v.to_str().ok())
		.map(|s| s.to_string())
}

/// `POST /session/start` - creates a new active session.
#[instrument(skip(state, headers, payload), fields(session_id = %payload.session_id))]
pub async fn start_session<R: QoeRepository>(
	State(state): State<Arc<QoeState<R>>>,
	headers: HeaderMap,
	Json(payload): Json<StartSessionRequest>,
) -> impl IntoResponse {
	if payload.session_id.is_empty() {
		return bad_request("invalid_session_id", "Session ID cannot be empty").into_response();
	}
	if payload.media_id.is_empty() {
		return bad_request("invalid_media_id", "Media ID cannot be empty").into_response();
	}

	let context = SessionContext {
		media_title: payload.media_title,
		device_class: payload.device_info.device_class,
		os_info: payload.device_info.os,
		app_version: payload.device_info.app_version,
		network_class: payload.network_type.unwrap_or_default(),
		user_agent: request_user_agent(&headers),
		endpoint_info: payload.endpoint_info,
	};
	let session = Session::new(
		SessionId::new(payload.session_id),
		payload.user_id.filter(|u| !u.is_empty()),
		payload.media_id,
		context,
	);

	match state.repository.create_session(&session).await {
		Ok(()) => {
			tracing::info!(session_id = %session.session_id, "Session started");
			(StatusCode::CREATED, Json(SessionResponse::from(session))).into_response()
		}
		Err(e @ QoeServerError::DuplicateSession(_)) => e.into_response(),
		Err(e) => {
			tracing::error!(error = %e, "Failed to create session");
			internal_error("Failed to start session").into_response()
		}
	}
}

/// `POST /session/{id}/event` - stores one critical event.
///
/// Rejects anything outside the critical taxonomy. `error` and `crash`
/// events also append to the session's recorded-error/crash arrays; those
/// appends are best-effort and never fail the recording.
#[instrument(skip(state, payload), fields(session_id = %session_id, event_type = %payload.event_type))]
pub async fn record_event<R: QoeRepository>(
	State(state): State<Arc<QoeState<R>>>,
	Path(session_id): Path<String>,
	Json(payload): Json<RecordEventRequest>,
) -> impl IntoResponse {
	let Ok(event_type) = payload.event_type.parse::<EventType>() else {
		return bad_request(
			"invalid_event_type",
			"Invalid event type. Only critical events are stored.",
		)
		.into_response();
	};
	if !event_type.is_client_recordable() {
		return bad_request(
			"invalid_event_type",
			"Invalid event type. Only critical events are stored.",
		)
		.into_response();
	}

	let event_payload = match EventPayload::from_event_data(event_type, payload.event_data) {
		Ok(p) => p,
		Err(e) => return bad_request("invalid_event_data", &e.to_string()).into_response(),
	};

	let session_id = SessionId::new(session_id);
	match state.repository.session_exists(&session_id).await {
		Ok(true) => {}
		Ok(false) => return not_found("Session not found").into_response(),
		Err(e) => {
			tracing::error!(error = %e, "Failed to look up session");
			return internal_error("Failed to record event").into_response();
		}
	}

	let event = QoeEvent::new(
		session_id.clone(),
		effective_user(payload.user_id),
		payload.media_id,
		event_payload,
	);
	if let Err(e) = state.repository.insert_event(&event).await {
		tracing::error!(error = %e, "Failed to insert event");
		return internal_error("Failed to record event").into_response();
	}

	match &event.payload {
		EventPayload::Error {
			code,
			message,
			at_position,
			kind,
			severity,
		} => {
			let recorded = RecordedError {
				kind: *kind,
				message: Some(message.clone()),
				code: Some(code.clone()),
				at_position: Some(*at_position),
				severity: *severity,
				occurred_at: event.timestamp,
			};
			if let Err(e) = state
				.repository
				.append_recorded_error(&session_id, &recorded)
				.await
			{
				tracing::warn!(error = %e, "Failed to append recorded error");
			}
		}
		EventPayload::Crash {
			kind,
			message,
			severity,
			..
		} => {
			let recorded = RecordedCrash {
				kind: kind.clone(),
				message: Some(message.clone()),
				severity: *severity,
				occurred_at: event.timestamp,
			};
			if let Err(e) = state
				.repository
				.append_recorded_crash(&session_id, &recorded)
				.await
			{
				tracing::warn!(error = %e, "Failed to append recorded crash");
			}
		}
		_ => {}
	}

	(
		StatusCode::CREATED,
		Json(EventResponse {
			id: event.id.to_string(),
			session_id: event.session_id.to_string(),
			event_type: event.event_type().to_string(),
			timestamp: event.timestamp,
		}),
	)
		.into_response()
}

/// `POST /session/{id}/end` - finalizes a session.
///
/// All derived metrics are recomputed server-side from the submitted
/// arrays, and the arrays are stored wholesale, so a retried finalize
/// converges instead of double-appending. The stored `ended_at` wins over
/// the clock on a retry, keeping the recomputed metrics identical.
#[instrument(skip(state, payload), fields(session_id = %session_id))]
pub async fn end_session<R: QoeRepository>(
	State(state): State<Arc<QoeState<R>>>,
	Path(session_id): Path<String>,
	Json(payload): Json<EndSessionRequest>,
) -> impl IntoResponse {
	let session_id = SessionId::new(session_id);
	let session = match state.repository.get_session(&session_id).await {
		Ok(Some(session)) => session,
		Ok(None) => return not_found("Session not found").into_response(),
		Err(e) => {
			tracing::error!(error = %e, "Failed to load session");
			return internal_error("Failed to end session").into_response();
		}
	};

	let already_finalized = session.is_finalized();
	let ended_at = session.ended_at.unwrap_or_else(Utc::now);
	let metrics = finalize_session(&FinalizationInput {
		started_at: session.started_at,
		ended_at,
		completed_percentage: payload.completed_percentage,
		buffering_events: &payload.buffering_events,
		quality_changes: &payload.quality_changes,
		playback_errors: &payload.playback_errors,
	});

	let update = SessionFinalization {
		ended_at,
		metrics,
		total_watch_duration: payload.total_watch_duration,
		completed_percentage: payload.completed_percentage,
		last_playback_position: payload.last_playback_position,
		buffering_events: payload.buffering_events,
		quality_changes: payload.quality_changes,
		playback_errors: payload.playback_errors,
		final_quality: payload.final_quality,
	};

	let finalized = match state.repository.finalize_session(&session_id, &update).await {
		Ok(Some(session)) => session,
		Ok(None) => return not_found("Session not found").into_response(),
		Err(e) => {
			tracing::error!(error = %e, "Failed to finalize session");
			return internal_error("Failed to end session").into_response();
		}
	};

	if !already_finalized {
		let end_event = QoeEvent::new(
			session_id.clone(),
			finalized.user_id.clone(),
			finalized.media_id.clone(),
			EventPayload::SessionEnd {},
		);
		if let Err(e) = state.repository.insert_event(&end_event).await {
			tracing::warn!(error = %e, "Failed to record session_end event");
		}
	}

	tracing::info!(
		session_id = %session_id,
		qoe_score = finalized.qoe_score,
		status = %finalized.status,
		"Session ended"
	);

	(StatusCode::OK, Json(SessionResponse::from(finalized))).into_response()
}

/// `GET /session/{id}` - returns the full session document.
#[instrument(skip(state), fields(session_id = %session_id))]
pub async fn get_session<R: QoeRepository>(
	State(state): State<Arc<QoeState<R>>>,
	Path(session_id): Path<String>,
) -> impl IntoResponse {
	match state
		.repository
		.get_session(&SessionId::new(session_id))
		.await
	{
		Ok(Some(session)) => {
			(StatusCode::OK, Json(SessionResponse::from(session))).into_response()
		}
		Ok(None) => not_found("Session not found").into_response(),
		Err(e) => {
			tracing::error!(error = %e, "Failed to load session");
			internal_error("Failed to fetch session").into_response()
		}
	}
}
