// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP handlers for the QoE endpoints.

pub mod analytics;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::ErrorResponse;

pub(crate) fn error_response(
	status: StatusCode,
	error: &str,
	message: &str,
) -> impl IntoResponse {
	(
		status,
		Json(ErrorResponse {
			error: error.to_string(),
			message: message.to_string(),
		}),
	)
}

pub(crate) fn bad_request(error: &str, message: &str) -> impl IntoResponse {
	error_response(StatusCode::BAD_REQUEST, error, message)
}

pub(crate) fn not_found(message: &str) -> impl IntoResponse {
	error_response(StatusCode::NOT_FOUND, "not_found", message)
}

pub(crate) fn internal_error(message: &str) -> impl IntoResponse {
	error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}
