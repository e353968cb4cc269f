// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the QoE collecting service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::api::ErrorResponse;

/// Errors that can occur in the QoE collecting service.
#[derive(Debug, Error)]
pub enum QoeServerError {
	/// Database error
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	/// Session not found
	#[error("session not found: {0}")]
	SessionNotFound(String),

	/// A session with this ID already exists
	#[error("session already exists: {0}")]
	DuplicateSession(String),

	/// Invalid stored session data
	#[error("invalid session data: {0}")]
	InvalidData(String),

	/// JSON serialization error
	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	/// Core error
	#[error("qoe core error: {0}")]
	Core(#[from] reel_qoe_core::QoeError),
}

/// Result type for collecting-service operations.
pub type Result<T> = std::result::Result<T, QoeServerError>;

impl IntoResponse for QoeServerError {
	fn into_response(self) -> Response {
		let (status, error) = match &self {
			QoeServerError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
			QoeServerError::DuplicateSession(_) => (StatusCode::CONFLICT, "duplicate_session"),
			QoeServerError::Core(_) => (StatusCode::BAD_REQUEST, "bad_request"),
			QoeServerError::Database(e) => {
				tracing::error!(error = %e, "Database error");
				(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
			}
			QoeServerError::Json(e) => {
				tracing::error!(error = %e, "Serialization error");
				(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
			}
			QoeServerError::InvalidData(e) => {
				tracing::error!(error = %e, "Invalid stored data");
				(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
			}
		};

		let message = match status {
			// Internal details stay in the logs.
			StatusCode::INTERNAL_SERVER_ERROR => "An internal error occurred".to_string(),
			_ => self.to_string(),
		};

		(
			status,
			Json(ErrorResponse {
				error: error.to_string(),
				message,
			}),
		)
			.into_response()
	}
}
