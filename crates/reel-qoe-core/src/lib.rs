// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Reel playback QoE tracking.
//!
//! This crate defines the shared domain model for the QoE system:
//!
//! - `session` - playback sessions and their accumulated metric records
//! - `event` - the critical event taxonomy and typed payloads
//! - `score` - the pure scoring engine and session finalization math
//!
//! No I/O happens here; the client SDK and the collecting service both build
//! on these types.

pub mod error;
pub mod event;
pub mod score;
pub mod session;

pub use error::QoeError;
pub use event::{EventId, EventPayload, EventType, QoeEvent};
pub use score::{
	finalize_session, live_score, qoe_score, quality_drop_penalty, round2, FinalMetrics,
	FinalizationInput,
};
pub use session::{
	BufferingInterval, DeviceClass, NetworkClass, PlaybackErrorRecord, QualityShift,
	RecordedCrash, RecordedError, RecordedErrorKind, Session, SessionContext, SessionId,
	SessionStatus, Severity, ANONYMOUS_USER,
};
