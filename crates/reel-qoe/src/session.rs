// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session lifecycle management.
//!
//! One tracker instance owns at most one playback session at a time:
//! `Idle -> Starting -> Active -> Ended`. The `Starting` guard is what makes
//! racing `start()` calls collapse into a single session.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reel_qoe_core::{
	live_score, BufferingInterval, PlaybackErrorRecord, QualityShift, RecordedCrash,
	RecordedError, SessionContext, SessionId, ANONYMOUS_USER,
};

use crate::classifier::{EventClassifier, LocalRecord, PlayerNotification, PlayerState};
use crate::error::{QoeSdkError, Result};
use crate::queue::DeliveryQueue;
use crate::transport::{
	DeviceInfo, EndSessionRequest, EventEnvelope, FinalizedSession, StartSessionRequest, Transport,
};

/// Lifecycle phase of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
	/// No session exists.
	Idle,
	/// A start request is in flight.
	Starting,
	/// A session is running.
	Active,
	/// The last session was finalized.
	Ended,
}

/// The session's local, append-only record arrays. These are the source of
/// truth for finalization; network failures never roll them back.
#[derive(Debug, Clone, Default)]
pub struct PlaybackLog {
	pub buffering_events: Vec<BufferingInterval>,
	pub quality_changes: Vec<QualityShift>,
	pub playback_errors: Vec<PlaybackErrorRecord>,
	pub recorded_errors: Vec<RecordedError>,
	pub recorded_crashes: Vec<RecordedCrash>,
}

/// Watch-time accumulator driven by the one-second ticker. Seconds only
/// accrue while the player's last reported state is `playing`.
#[derive(Debug, Default)]
struct WatchClock {
	playing: AtomicBool,
	seconds: AtomicI64,
}

impl WatchClock {
	fn set_playing(&self, playing: bool) {
		self.playing.store(playing, Ordering::SeqCst);
	}

	fn tick(&self) {
		if self.playing.load(Ordering::SeqCst) {
			self.seconds.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn seconds(&self) -> i64 {
		self.seconds.load(Ordering::SeqCst)
	}

	fn reset(&self) {
		self.playing.store(false, Ordering::SeqCst);
		self.seconds.store(0, Ordering::SeqCst);
	}
}

async fn run_watch_ticker(clock: Arc<WatchClock>, cancel: CancellationToken) {
	let mut interval = tokio::time::interval(Duration::from_secs(1));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	// The first tick completes immediately; consume it so a second of watch
	// time takes a second of wall clock.
	interval.tick().await;

	loop {
		tokio::select! {
			() = cancel.cancelled() => break,
			_ = interval.tick() => clock.tick(),
		}
	}
}

#[derive(Debug)]
struct TrackerState {
	phase: TrackerPhase,
	session_id: Option<SessionId>,
	media_id: Option<String>,
	classifier: EventClassifier,
	log: PlaybackLog,
	buffering_count: u32,
	error_count: u32,
	live_score: u8,
	session_cancel: Option<CancellationToken>,
}

impl TrackerState {
	fn new() -> Self {
		Self {
			phase: TrackerPhase::Idle,
			session_id: None,
			media_id: None,
			classifier: EventClassifier::default(),
			log: PlaybackLog::default(),
			buffering_count: 0,
			error_count: 0,
			live_score: 100,
			session_cancel: None,
		}
	}
}

/// Owns the session lifecycle, the classifier, and the local metric log for
/// one playback client.
pub struct SessionTracker {
	transport: Arc<Transport>,
	queue: Arc<DeliveryQueue>,
	user_id: Option<String>,
	context: SessionContext,
	state: Mutex<TrackerState>,
	watch: Arc<WatchClock>,
}

impl SessionTracker {
	#[must_use]
	pub fn new(
		transport: Arc<Transport>,
		queue: Arc<DeliveryQueue>,
		user_id: Option<String>,
		context: SessionContext,
	) -> Self {
		Self {
			transport,
			queue,
			user_id,
			context,
			state: Mutex::new(TrackerState::new()),
			watch: Arc::new(WatchClock::default()),
		}
	}

	fn effective_user(&self) -> String {
		self.user_id
			.clone()
			.unwrap_or_else(|| ANONYMOUS_USER.to_string())
	}

	/// Starts a new session for `media_id`.
	///
	/// Returns `Ok(None)` (with a warning) when a session is already active
	/// or a start is in flight - at most one session exists per tracker. On
	/// success the delivery spool for the new session id is flushed
	/// unconditionally.
	pub async fn start(&self, media_id: &str) -> Result<Option<SessionId>> {
		{
			let mut state = self.state.lock().await;
			if matches!(state.phase, TrackerPhase::Starting | TrackerPhase::Active) {
				warn!(phase = ?state.phase, "Session already exists or starting; ignoring start");
				return Ok(None);
			}
			state.phase = TrackerPhase::Starting;
		}

		let session_id = SessionId::generate();
		let request = StartSessionRequest {
			session_id: session_id.clone(),
			user_id: self.user_id.clone(),
			media_id: media_id.to_string(),
			media_title: self.context.media_title.clone(),
			device_info: DeviceInfo {
				device_class: self.context.device_class,
				os: self.context.os_info.clone(),
				app_version: self.context.app_version.clone(),
			},
			network_type: Some(self.context.network_class),
			endpoint_info: self.context.endpoint_info.clone(),
		};

		match self.transport.start_session(&request).await {
			Ok(()) => {
				let cancel = CancellationToken::new();
				{
					let mut state = self.state.lock().await;
					state.phase = TrackerPhase::Active;
					state.session_id = Some(session_id.clone());
					state.media_id = Some(media_id.to_string());
					state.classifier = EventClassifier::new(self.context.user_agent.clone());
					state.log = PlaybackLog::default();
					state.buffering_count = 0;
					state.error_count = 0;
					state.live_score = 100;
					state.session_cancel = Some(cancel.clone());
				}
				self.watch.reset();
				tokio::spawn(run_watch_ticker(Arc::clone(&self.watch), cancel.clone()));
				tokio::spawn(
					Arc::clone(&self.queue).run_resync(session_id.clone(), cancel),
				);

				info!(session_id = %session_id, media_id, "Session started");

				// Replays anything a prior aborted session left behind for
				// this id space; a no-op for a fresh id.
				if let Err(e) = self.queue.flush(&session_id).await {
					warn!(session_id = %session_id, error = %e, "Initial spool flush failed");
				}

				Ok(Some(session_id))
			}
			Err(e) => {
				let mut state = self.state.lock().await;
				state.phase = TrackerPhase::Idle;
				Err(e)
			}
		}
	}

	/// Feeds one raw player notification through the classifier.
	///
	/// Local state always updates; network delivery happens behind the
	/// offline queue and can never fail the caller.
	pub async fn notify(&self, notification: PlayerNotification) {
		let (session_id, media_id, wire_event, connectivity_restored) = {
			let mut state = self.state.lock().await;
			if state.phase != TrackerPhase::Active {
				warn!("No active session - notification not recorded");
				return;
			}

			if let PlayerNotification::StateChange { state: player_state, .. } = &notification {
				self.watch
					.set_playing(*player_state == PlayerState::Playing);
			}

			let classification = state.classifier.classify(notification);
			for record in classification.local {
				match record {
					LocalRecord::BufferingOpened => state.buffering_count += 1,
					LocalRecord::BufferingClosed(interval) => {
						state.log.buffering_events.push(interval);
					}
					LocalRecord::QualityShift(shift) => state.log.quality_changes.push(shift),
					LocalRecord::PlaybackError(error) => {
						state.log.playback_errors.push(error);
						state.error_count += 1;
					}
					LocalRecord::RecordedError(error) => state.log.recorded_errors.push(error),
					LocalRecord::RecordedCrash(crash) => state.log.recorded_crashes.push(crash),
				}
			}
			state.live_score = live_score(state.buffering_count, state.error_count);

			(
				state.session_id.clone().expect("active session has an id"),
				state.media_id.clone().expect("active session has a media id"),
				classification.wire_event,
				classification.connectivity_restored,
			)
		};

		if connectivity_restored {
			self.queue.notify_online();
		}

		if let Some(payload) = wire_event {
			let envelope = EventEnvelope {
				user_id: self.effective_user(),
				media_id,
				event_type: payload.event_type(),
				event_data: payload,
			};
			self.queue.enqueue_and_send(&session_id, envelope).await;
		}
	}

	/// Ends the active session, submitting the accumulated metric arrays for
	/// server-side finalization.
	///
	/// On delivery failure the tracker keeps all local state and stays
	/// active so the caller can retry; terminal metrics are never silently
	/// discarded.
	pub async fn end(&self, final_position: f64, media_duration: f64) -> Result<FinalizedSession> {
		let (session_id, request) = {
			let state = self.state.lock().await;
			if state.phase != TrackerPhase::Active {
				return Err(QoeSdkError::NoActiveSession);
			}

			let completed_percentage = if media_duration > 0.0 {
				((final_position / media_duration) * 100.0).round()
			} else {
				0.0
			};

			let request = EndSessionRequest {
				total_watch_duration: self.watch.seconds(),
				completed_percentage,
				last_playback_position: final_position,
				buffering_events: state.log.buffering_events.clone(),
				quality_changes: state.log.quality_changes.clone(),
				playback_errors: state.log.playback_errors.clone(),
				final_quality: state.classifier.current_quality().map(String::from),
			};
			(
				state.session_id.clone().expect("active session has an id"),
				request,
			)
		};

		match self.transport.end_session(&session_id, &request).await {
			Ok(finalized) => {
				let mut state = self.state.lock().await;
				state.phase = TrackerPhase::Ended;
				if let Some(cancel) = state.session_cancel.take() {
					cancel.cancel();
				}
				self.watch.set_playing(false);
				info!(
					session_id = %session_id,
					qoe_score = finalized.qoe_score,
					status = %finalized.status,
					"Session ended"
				);
				Ok(finalized)
			}
			Err(e) => {
				warn!(
					session_id = %session_id,
					error = %e,
					"Failed to finalize session; local state retained for retry"
				);
				Err(e)
			}
		}
	}

	/// Cancels the session's background tasks without finalizing. Used at
	/// client shutdown.
	pub async fn abort(&self) {
		let mut state = self.state.lock().await;
		if let Some(cancel) = state.session_cancel.take() {
			cancel.cancel();
		}
		self.watch.set_playing(false);
		debug!("Tracker background tasks stopped");
	}

	/// Current lifecycle phase.
	pub async fn phase(&self) -> TrackerPhase {
		self.state.lock().await.phase
	}

	/// The active session's id, if any.
	pub async fn session_id(&self) -> Option<SessionId> {
		self.state.lock().await.session_id.clone()
	}

	/// Snapshot of the local metric log.
	pub async fn playback_log(&self) -> PlaybackLog {
		self.state.lock().await.log.clone()
	}

	/// Interim score shown during playback.
	pub async fn live_score(&self) -> u8 {
		self.state.lock().await.live_score
	}

	/// Accumulated watch time in seconds.
	#[must_use]
	pub fn watch_duration(&self) -> i64 {
		self.watch.seconds()
	}
}
