// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the QoE core model.

use thiserror::Error;

/// Errors that can occur when parsing or validating QoE domain values.
#[derive(Debug, Error)]
pub enum QoeError {
	/// Invalid session status string
	#[error("invalid session status: {0}")]
	InvalidStatus(String),

	/// Invalid device class string
	#[error("invalid device class: {0}")]
	InvalidDeviceClass(String),

	/// Invalid network class string
	#[error("invalid network class: {0}")]
	InvalidNetworkClass(String),

	/// Invalid event type string
	#[error("invalid event type: {0}")]
	InvalidEventType(String),

	/// Invalid severity string
	#[error("invalid severity: {0}")]
	InvalidSeverity(String),

	/// Invalid recorded-error kind string
	#[error("invalid recorded error kind: {0}")]
	InvalidErrorKind(String),

	/// Invalid session ID
	#[error("invalid session ID: {0}")]
	InvalidSessionId(String),

	/// Event data does not match the declared event type
	#[error("invalid event data: {0}")]
	InvalidEventData(String),
}
