// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application wiring for the Reel QoE collecting service.

pub mod config;

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use reel_server_qoe::{QoeState, SqliteQoeRepository};

pub use config::{load_config, ConfigError, ServerConfig};

/// Builds the full application router on top of a database pool.
pub fn create_app(pool: SqlitePool) -> Router {
	let state = Arc::new(QoeState::new(SqliteQoeRepository::new(pool)));

	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods(Any)
		.allow_headers(Any);

	Router::new()
		.nest("/api/qoe", reel_server_qoe::router(state))
		.layer(cors)
		.layer(TraceLayer::new_for_http())
}
