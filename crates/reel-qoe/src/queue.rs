// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Offline delivery queue with at-least-once semantics.
//!
//! Every classified event gets one immediate delivery attempt; anything that
//! fails lands in the durable spool and is retried by `flush`. Delivery
//! failures never surface to the classification path - playback must not
//! care whether the collecting service is reachable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reel_qoe_core::SessionId;

use crate::error::Result;
use crate::spool::{EventSpool, SpoolEntry};
use crate::transport::{EventEnvelope, Transport};

/// Backoff schedule for the background resync task: exponential with a cap,
/// reset after a flush that drains the spool.
#[derive(Debug, Clone)]
pub struct ResyncPolicy {
	pub initial_interval: Duration,
	pub max_interval: Duration,
	pub multiplier: f64,
}

impl Default for ResyncPolicy {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_secs(5),
			max_interval: Duration::from_secs(60),
			multiplier: 2.0,
		}
	}
}

impl ResyncPolicy {
	fn next_interval(&self, current: Duration) -> Duration {
		let grown = current.as_secs_f64() * self.multiplier;
		Duration::from_secs_f64(grown.min(self.max_interval.as_secs_f64()))
	}
}

/// Result of one flush pass over a session's spool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
	pub delivered: usize,
	pub remaining: usize,
}

/// Client-held queue of not-yet-confirmed events.
pub struct DeliveryQueue {
	transport: Arc<Transport>,
	spool: EventSpool,
	/// Guards spool file operations only; network sends happen outside it,
	/// so appends never wait on a slow flush.
	file_lock: Mutex<()>,
	/// Serializes whole flush passes.
	flush_lock: Mutex<()>,
	resync_notify: Notify,
	policy: ResyncPolicy,
}

impl DeliveryQueue {
	#[must_use]
	pub fn new(transport: Arc<Transport>, spool: EventSpool, policy: ResyncPolicy) -> Self {
		Self {
			transport,
			spool,
			file_lock: Mutex::new(()),
			flush_lock: Mutex::new(()),
			resync_notify: Notify::new(),
			policy,
		}
	}

	/// Attempts one immediate delivery; on any failure the event is spooled.
	/// Never returns an error to the caller - a broken network must not
	/// break playback.
	pub async fn enqueue_and_send(&self, session_id: &SessionId, envelope: EventEnvelope) {
		match self.transport.send_event(session_id, &envelope).await {
			Ok(()) => {
				debug!(session_id = %session_id, event_type = %envelope.event_type, "Event delivered");
			}
			Err(e) => {
				warn!(
					session_id = %session_id,
					event_type = %envelope.event_type,
					error = %e,
					"Immediate delivery failed, spooling event"
				);
				let entry = SpoolEntry::new(envelope);
				let _guard = self.file_lock.lock().await;
				if let Err(spool_err) = self.spool.append(session_id, &entry).await {
					// Out of options: the event survives only in the session's
					// local arrays at this point.
					warn!(session_id = %session_id, error = %spool_err, "Failed to spool event");
				}
			}
		}
	}

	/// Delivers spooled entries in FIFO order. Entries that fail stay
	/// spooled for the next flush; entries appended while this flush runs
	/// are untouched. Safe to call when the spool is empty.
	pub async fn flush(&self, session_id: &SessionId) -> Result<FlushOutcome> {
		let _flush_guard = self.flush_lock.lock().await;

		let snapshot = {
			let _guard = self.file_lock.lock().await;
			self.spool.load(session_id).await?
		};
		if snapshot.is_empty() {
			return Ok(FlushOutcome {
				delivered: 0,
				remaining: 0,
			});
		}

		debug!(session_id = %session_id, pending = snapshot.len(), "Flushing spooled events");

		let mut failed = Vec::new();
		let mut delivered = 0;
		for entry in &snapshot {
			match self.transport.send_event(session_id, &entry.event).await {
				Ok(()) => delivered += 1,
				Err(e) => {
					debug!(session_id = %session_id, error = %e, "Spooled event still undeliverable");
					failed.push(entry.clone());
				}
			}
		}

		let remaining = {
			let _guard = self.file_lock.lock().await;
			self.spool
				.replace_prefix(session_id, snapshot.len(), failed)
				.await?;
			self.spool.pending_count(session_id).await
		};

		debug!(session_id = %session_id, delivered, remaining, "Flush pass finished");
		Ok(FlushOutcome {
			delivered,
			remaining,
		})
	}

	/// Number of spooled entries for a session.
	pub async fn pending_count(&self, session_id: &SessionId) -> usize {
		self.spool.pending_count(session_id).await
	}

	/// Drops a session's spool (used when the session is abandoned).
	pub async fn discard(&self, session_id: &SessionId) -> Result<()> {
		let _guard = self.file_lock.lock().await;
		self.spool.clear(session_id).await
	}

	/// Wakes the resync task, e.g. on a connectivity-restored notification.
	pub fn notify_online(&self) {
		self.resync_notify.notify_one();
	}

	/// Runs the background resync loop for one session until cancelled.
	///
	/// Flushes immediately when woken by [`notify_online`](Self::notify_online)
	/// and otherwise on a capped exponential backoff while entries remain.
	pub async fn run_resync(self: Arc<Self>, session_id: SessionId, cancel: CancellationToken) {
		let mut interval = self.policy.initial_interval;

		loop {
			tokio::select! {
				() = cancel.cancelled() => {
					debug!(session_id = %session_id, "Resync task stopped");
					break;
				}
				() = self.resync_notify.notified() => {
					interval = self.flush_and_adjust(&session_id, self.policy.initial_interval).await;
				}
				() = tokio::time::sleep(interval) => {
					if self.pending_count(&session_id).await == 0 {
						interval = self.policy.initial_interval;
						continue;
					}
					interval = self.flush_and_adjust(&session_id, interval).await;
				}
			}
		}
	}

	/// Flushes once; returns the next backoff interval (reset when the spool
	/// drained, grown when entries remain).
	async fn flush_and_adjust(&self, session_id: &SessionId, current: Duration) -> Duration {
		match self.flush(session_id).await {
			Ok(outcome) if outcome.remaining == 0 => self.policy.initial_interval,
			Ok(_) => self.policy.next_interval(current),
			Err(e) => {
				warn!(session_id = %session_id, error = %e, "Resync flush failed");
				self.policy.next_interval(current)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reel_common_http::RetryConfig;
	use reel_qoe_core::{EventPayload, EventType};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn envelope(at_position: f64) -> EventEnvelope {
		EventEnvelope {
			user_id: "user_1".to_string(),
			media_id: "media_1".to_string(),
			event_type: EventType::BufferingEnd,
			event_data: EventPayload::BufferingEnd {
				duration_secs: 1.5,
				quality: None,
				at_position,
			},
		}
	}

	fn queue_for(base_url: String, dir: &std::path::Path) -> DeliveryQueue {
		let transport = Arc::new(Transport::new(
			reel_common_http::new_client(),
			base_url,
			RetryConfig::no_retries(),
			Duration::from_secs(2),
			None,
		));
		DeliveryQueue::new(transport, EventSpool::new(dir), ResyncPolicy::default())
	}

	#[tokio::test]
	async fn delivered_event_is_not_spooled() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/qoe/session/session_1/event"))
			.respond_with(ResponseTemplate::new(201))
			.expect(1)
			.mount(&server)
			.await;

		let dir = tempfile::tempdir().unwrap();
		let queue = queue_for(server.uri(), dir.path());
		let session_id = SessionId::new("session_1");

		queue.enqueue_and_send(&session_id, envelope(1.0)).await;
		assert_eq!(queue.pending_count(&session_id).await, 0);
	}

	#[tokio::test]
	async fn failed_event_is_spooled_not_raised() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let dir = tempfile::tempdir().unwrap();
		let queue = queue_for(server.uri(), dir.path());
		let session_id = SessionId::new("session_1");

		queue.enqueue_and_send(&session_id, envelope(1.0)).await;
		queue.enqueue_and_send(&session_id, envelope(2.0)).await;
		assert_eq!(queue.pending_count(&session_id).await, 2);
	}

	#[tokio::test]
	async fn flush_after_recovery_drains_the_spool() {
		let server = MockServer::start().await;
		// Down at first...
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.up_to_n_times(2)
			.mount(&server)
			.await;
		// ...then recovered.
		Mock::given(method("POST"))
			.and(path("/api/qoe/session/session_1/event"))
			.respond_with(ResponseTemplate::new(201))
			.expect(2)
			.mount(&server)
			.await;

		let dir = tempfile::tempdir().unwrap();
		let queue = queue_for(server.uri(), dir.path());
		let session_id = SessionId::new("session_1");

		queue.enqueue_and_send(&session_id, envelope(1.0)).await;
		queue.enqueue_and_send(&session_id, envelope(2.0)).await;
		assert_eq!(queue.pending_count(&session_id).await, 2);

		let outcome = queue.flush(&session_id).await.unwrap();
		assert_eq!(outcome.delivered, 2);
		assert_eq!(outcome.remaining, 0);
		assert_eq!(queue.pending_count(&session_id).await, 0);
	}

	#[tokio::test]
	async fn flush_keeps_entries_that_still_fail() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let dir = tempfile::tempdir().unwrap();
		let queue = queue_for(server.uri(), dir.path());
		let session_id = SessionId::new("session_1");

		queue.enqueue_and_send(&session_id, envelope(1.0)).await;
		let outcome = queue.flush(&session_id).await.unwrap();
		assert_eq!(outcome.delivered, 0);
		assert_eq!(outcome.remaining, 1);
	}

	#[tokio::test]
	async fn flush_on_empty_spool_is_a_noop() {
		let server = MockServer::start().await;
		let dir = tempfile::tempdir().unwrap();
		let queue = queue_for(server.uri(), dir.path());
		let session_id = SessionId::new("session_1");

		let outcome = queue.flush(&session_id).await.unwrap();
		assert_eq!(outcome.delivered, 0);
		assert_eq!(outcome.remaining, 0);
	}

	#[tokio::test]
	async fn resync_task_drains_after_notify_online() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/qoe/session/session_1/event"))
			.respond_with(ResponseTemplate::new(201))
			.mount(&server)
			.await;

		let dir = tempfile::tempdir().unwrap();
		let queue = Arc::new(queue_for(server.uri(), dir.path()));
		let session_id = SessionId::new("session_1");

		// Spool an entry directly, as if it failed while offline.
		{
			let spool = EventSpool::new(dir.path());
			spool
				.append(&session_id, &SpoolEntry::new(envelope(1.0)))
				.await
				.unwrap();
		}
		assert_eq!(queue.pending_count(&session_id).await, 1);

		let cancel = CancellationToken::new();
		let task = tokio::spawn(Arc::clone(&queue).run_resync(session_id.clone(), cancel.clone()));

		queue.notify_online();

		// Wait for the resync pass to drain the spool.
		for _ in 0..50 {
			if queue.pending_count(&session_id).await == 0 {
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}
		assert_eq!(queue.pending_count(&session_id).await, 0);

		cancel.cancel();
		task.await.unwrap();
	}

	#[test]
	fn resync_policy_backoff_caps() {
		let policy = ResyncPolicy {
			initial_interval: Duration::from_secs(5),
			max_interval: Duration::from_secs(60),
			multiplier: 2.0,
		};
		let mut interval = policy.initial_interval;
		interval = policy.next_interval(interval);
		assert_eq!(interval, Duration::from_secs(10));
		interval = policy.next_interval(interval);
		assert_eq!(interval, Duration::from_secs(20));
		for _ in 0..10 {
			interval = policy.next_interval(interval);
		}
		assert_eq!(interval, Duration::from_secs(60));
	}
}
