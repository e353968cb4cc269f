// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Router composition for the QoE endpoints.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::repository::QoeRepository;

/// Shared state for the QoE handlers.
pub struct QoeState<R: QoeRepository> {
	pub repository: R,
}

impl<R: QoeRepository> QoeState<R> {
	pub fn new(repository: R) -> Self {
		Self { repository }
	}
}

/// Builds the QoE router. Callers nest it under their API prefix
/// (`/api/qoe` in the server binary).
pub fn router<R: QoeRepository + 'static>(state: Arc<QoeState<R>>) -> Router {
	Router::new()
		.route("/session/start", post(handlers::sessions::start_session::<R>))
		.route("/session/{session_id}", get(handlers::sessions::get_session::<R>))
		.route(
			"/session/{session_id}/event",
			post(handlers::sessions::record_event::<R>),
		)
		.route(
			"/session/{session_id}/end",
			post(handlers::sessions::end_session::<R>),
		)
		.route("/analytics", get(handlers::analytics::get_analytics::<R>))
		.with_state(state)
}
