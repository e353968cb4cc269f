// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the QoE client SDK.

use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, QoeSdkError>;

/// Errors that can occur in the QoE client SDK.
#[derive(Debug, Error)]
pub enum QoeSdkError {
	/// The client has been shut down.
	#[error("QoE client has been shut down")]
	ClientShutdown,

	/// Base URL is missing or malformed.
	#[error("invalid base URL")]
	InvalidBaseUrl,

	/// An operation required an active session and none exists.
	#[error("no active session")]
	NoActiveSession,

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Collecting service returned an error.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Error message from the server.
		message: String,
	},

	/// Spool file I/O failed.
	#[error("spool I/O error: {0}")]
	Spool(#[from] std::io::Error),

	/// Failed to (de)serialize an event.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
