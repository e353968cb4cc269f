// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client SDK for Reel playback QoE tracking.
//!
//! The SDK sits between a media player and the Reel collecting service. Raw
//! player notifications go in; the classifier keeps the significant ones,
//! the delivery queue ships them (spooling to disk through outages), and the
//! session tracker owns the lifecycle and the metrics that feed the final
//! QoE score.
//!
//! # Example
//!
//! ```ignore
//! use reel_qoe::{PlayerNotification, PlayerState, QoeClient};
//!
//! let client = QoeClient::builder()
//!     .base_url("https://reel.example.com")
//!     .user_id("user_42")
//!     .spool_dir("/var/lib/myapp/reel-spool")
//!     .build()?;
//!
//! // First play starts the session
//! let session_id = client.start("media_123").await?;
//!
//! // Forward player notifications as they happen
//! client
//!     .notify(PlayerNotification::StateChange {
//!         state: PlayerState::Buffering,
//!         position: 41.0,
//!     })
//!     .await;
//!
//! // Playback finished
//! client.end(1710.0, 1800.0).await?;
//! client.shutdown().await;
//! ```

pub mod classifier;
pub mod client;
pub mod error;
pub mod queue;
pub mod session;
pub mod spool;
pub mod transport;

pub use classifier::{Classification, EventClassifier, LocalRecord, PlayerNotification, PlayerState};
pub use client::{ClientConfig, QoeClient, QoeClientBuilder};
pub use error::{QoeSdkError, Result};
pub use queue::{DeliveryQueue, FlushOutcome, ResyncPolicy};
pub use session::{PlaybackLog, SessionTracker, TrackerPhase};
pub use spool::{EventSpool, SpoolEntry};
pub use transport::{
	DeviceInfo, EndSessionRequest, EventEnvelope, FinalizedSession, StartSessionRequest, Transport,
};
