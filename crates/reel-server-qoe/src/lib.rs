// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collecting-service implementation for Reel QoE sessions.
//!
//! This crate provides the server side of the QoE system:
//!
//! - `repository` - database operations for sessions, events, and recorded
//!   errors/crashes
//! - `handlers` / `routes` - the HTTP surface (session lifecycle + analytics)
//! - `report` - the aggregation engine producing windowed analytics
//! - `schema` - pool construction and schema bootstrap
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reel_server_qoe::{router, schema, QoeState, SqliteQoeRepository};
//!
//! let pool = schema::create_pool("sqlite:./reel.db").await?;
//! schema::migrate(&pool).await?;
//! let state = Arc::new(QoeState::new(SqliteQoeRepository::new(pool)));
//! let app = axum::Router::new().nest("/api/qoe", router(state));
//! ```

pub mod api;
pub mod error;
pub mod handlers;
pub mod report;
pub mod repository;
pub mod routes;
pub mod schema;

pub use error::{QoeServerError, Result};
pub use report::{AnalyticsReport, DateRange, MediaRollup, ReportBuilder, UserRollup};
pub use repository::{
	QoeRepository, SessionFinalization, SessionWindow, SqliteQoeRepository,
};
pub use routes::{router, QoeState};

// Re-export core types for convenience
pub use reel_qoe_core::*;
