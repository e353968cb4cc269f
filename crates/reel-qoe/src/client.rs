// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! QoE client for tracking playback sessions against a Reel collecting
//! service.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reel_common_http::RetryConfig;
use tracing::info;

use reel_qoe_core::{SessionContext, SessionId};

use crate::classifier::PlayerNotification;
use crate::error::{QoeSdkError, Result};
use crate::queue::{DeliveryQueue, ResyncPolicy};
use crate::session::{PlaybackLog, SessionTracker, TrackerPhase};
use crate::spool::EventSpool;
use crate::transport::{FinalizedSession, Transport};

/// Configuration for the QoE client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Timeout for session start/end requests.
	pub request_timeout: Duration,
	/// Timeout for the single immediate delivery attempt of an event.
	/// Deliberately short - a slow send must not delay classification.
	pub event_send_timeout: Duration,
	/// Retry configuration for session start/end requests.
	pub retry_config: RetryConfig,
	/// Backoff schedule for the background spool resync.
	pub resync_policy: ResyncPolicy,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			event_send_timeout: Duration::from_secs(5),
			retry_config: RetryConfig::default(),
			resync_policy: ResyncPolicy::default(),
		}
	}
}

/// Builder for constructing a [`QoeClient`].
pub struct QoeClientBuilder {
	base_url: Option<String>,
	user_id: Option<String>,
	spool_dir: Option<PathBuf>,
	context: SessionContext,
	config: ClientConfig,
}

impl QoeClientBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self {
			base_url: None,
			user_id: None,
			spool_dir: None,
			context: SessionContext::default(),
			config: ClientConfig::default(),
		}
	}

	/// Sets the base URL of the collecting service.
	///
	/// Example: `https://reel.example.com`
	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());
		self
	}

	/// Sets the user identifier attached to sessions and events. Sessions
	/// without one are recorded as anonymous.
	pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	/// Sets the directory for the durable offline event spool. Defaults to
	/// `reel-spool` under the system temp directory; point this somewhere
	/// persistent if events must survive reboots.
	pub fn spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.spool_dir = Some(dir.into());
		self
	}

	/// Sets the device/network context captured at session start.
	pub fn context(mut self, context: SessionContext) -> Self {
		self.context = context;
		self
	}

	/// Sets the timeout for session start/end requests.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// Sets the timeout for the immediate delivery attempt of an event.
	pub fn event_send_timeout(mut self, timeout: Duration) -> Self {
		self.config.event_send_timeout = timeout;
		self
	}

	/// Sets the retry configuration for session start/end requests.
	pub fn retry_config(mut self, config: RetryConfig) -> Self {
		self.config.retry_config = config;
		self
	}

	/// Sets the backoff schedule for the background spool resync.
	pub fn resync_policy(mut self, policy: ResyncPolicy) -> Self {
		self.config.resync_policy = policy;
		self
	}

	/// Builds the [`QoeClient`].
	pub fn build(self) -> Result<QoeClient> {
		let base_url = self.base_url.ok_or(QoeSdkError::InvalidBaseUrl)?;
		if base_url.is_empty() {
			return Err(QoeSdkError::InvalidBaseUrl);
		}
		let base_url = base_url.trim_end_matches('/').to_string();

		let http_client = reel_common_http::builder()
			.timeout(self.config.request_timeout)
			.build()
			.map_err(QoeSdkError::RequestFailed)?;

		let spool_dir = self
			.spool_dir
			.unwrap_or_else(|| std::env::temp_dir().join("reel-spool"));

		let transport = Arc::new(Transport::new(
			http_client,
			base_url.clone(),
			self.config.retry_config.clone(),
			self.config.event_send_timeout,
			self.context.user_agent.clone(),
		));
		let queue = Arc::new(DeliveryQueue::new(
			Arc::clone(&transport),
			EventSpool::new(spool_dir),
			self.config.resync_policy.clone(),
		));
		let tracker = SessionTracker::new(
			Arc::clone(&transport),
			Arc::clone(&queue),
			self.user_id,
			self.context,
		);

		info!(base_url = %base_url, "QoE client initialized");

		Ok(QoeClient {
			tracker,
			queue,
			closed: AtomicBool::new(false),
		})
	}
}

impl Default for QoeClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Client for tracking playback QoE sessions.
///
/// Owns the session lifecycle, the event classifier, and the offline
/// delivery queue. One client instance tracks at most one active session.
pub struct QoeClient {
	tracker: SessionTracker,
	queue: Arc<DeliveryQueue>,
	closed: AtomicBool,
}

impl QoeClient {
	/// Creates a new builder for constructing a client.
	pub fn builder() -> QoeClientBuilder {
		QoeClientBuilder::new()
	}

	fn check_closed(&self) -> Result<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(QoeSdkError::ClientShutdown);
		}
		Ok(())
	}

	/// Starts a session for `media_id`. See [`SessionTracker::start`].
	pub async fn start(&self, media_id: &str) -> Result<Option<SessionId>> {
		self.check_closed()?;
		self.tracker.start(media_id).await
	}

	/// Forwards a raw player notification. Non-critical notifications are
	/// discarded; critical ones update local state and are delivered with
	/// at-least-once semantics. Never fails the caller.
	pub async fn notify(&self, notification: PlayerNotification) {
		if self.closed.load(Ordering::SeqCst) {
			return;
		}
		self.tracker.notify(notification).await;
	}

	/// Ends the active session. See [`SessionTracker::end`].
	pub async fn end(&self, final_position: f64, media_duration: f64) -> Result<FinalizedSession> {
		self.check_closed()?;
		self.tracker.end(final_position, media_duration).await
	}

	/// Flushes the spool for the active session, if any.
	pub async fn flush(&self) -> Result<()> {
		if let Some(session_id) = self.tracker.session_id().await {
			self.queue.flush(&session_id).await?;
		}
		Ok(())
	}

	/// Current lifecycle phase.
	pub async fn phase(&self) -> TrackerPhase {
		self.tracker.phase().await
	}

	/// The active session's id, if any.
	pub async fn session_id(&self) -> Option<SessionId> {
		self.tracker.session_id().await
	}

	/// Snapshot of the session's local metric log.
	pub async fn playback_log(&self) -> PlaybackLog {
		self.tracker.playback_log().await
	}

	/// Interim score shown during playback.
	pub async fn live_score(&self) -> u8 {
		self.tracker.live_score().await
	}

	/// Accumulated watch time in seconds.
	#[must_use]
	pub fn watch_duration(&self) -> i64 {
		self.tracker.watch_duration()
	}

	/// Shuts the client down, stopping background tasks. Does not finalize
	/// an active session - call [`end`](Self::end) first if its metrics
	/// should be persisted.
	pub async fn shutdown(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		self.tracker.abort().await;
		info!("QoE client shutdown");
	}

	/// Returns true if the client has been shut down.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_requires_base_url() {
		let result = QoeClientBuilder::new().build();
		assert!(matches!(result, Err(QoeSdkError::InvalidBaseUrl)));
	}

	#[test]
	fn test_builder_rejects_empty_base_url() {
		let result = QoeClientBuilder::new().base_url("").build();
		assert!(matches!(result, Err(QoeSdkError::InvalidBaseUrl)));
	}

	#[test]
	fn test_builder_success() {
		let result = QoeClientBuilder::new()
			.base_url("https://reel.example.com")
			.user_id("user_1")
			.build();
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn test_shutdown_prevents_start() {
		let client = QoeClientBuilder::new()
			.base_url("https://reel.example.com")
			.build()
			.unwrap();

		client.shutdown().await;
		let result = client.start("media_1").await;
		assert!(matches!(result, Err(QoeSdkError::ClientShutdown)));
	}

	#[tokio::test]
	async fn test_double_shutdown_is_ok() {
		let client = QoeClientBuilder::new()
			.base_url("https://reel.example.com")
			.build()
			.unwrap();

		client.shutdown().await;
		client.shutdown().await;
		assert!(client.is_closed());
	}

	#[test]
	fn test_builder_normalizes_base_url() {
		let client = QoeClientBuilder::new()
			.base_url("https://reel.example.com/")
			.build()
			.unwrap();
		// Normalization shows up in request URLs; at minimum the client
		// must build without a trailing slash tripping it up.
		assert!(!client.is_closed());
	}

	#[test]
	fn test_client_config_defaults() {
		let config = ClientConfig::default();
		assert_eq!(config.request_timeout, Duration::from_secs(30));
		assert_eq!(config.event_send_timeout, Duration::from_secs(5));
	}
}
