// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry logic with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Maximum number of attempts, including the first.
	pub max_attempts: u32,
	/// Backoff before the first retry.
	pub initial_backoff: Duration,
	/// Upper bound on any single backoff.
	pub max_backoff: Duration,
	/// Multiplier applied to the backoff after each attempt.
	pub backoff_multiplier: f64,
	/// Fractional jitter applied to each backoff (0.1 = +/- 10%).
	pub jitter: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			initial_backoff: Duration::from_millis(500),
			max_backoff: Duration::from_secs(10),
			backoff_multiplier: 2.0,
			jitter: 0.1,
		}
	}
}

impl RetryConfig {
	/// A configuration that never retries.
	#[must_use]
	pub fn no_retries() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}

	fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let base = self.initial_backoff.as_secs_f64()
			* self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
		let capped = base.min(self.max_backoff.as_secs_f64());
		let jitter = 1.0 + self.jitter * (fastrand::f64() * 2.0 - 1.0);
		Duration::from_secs_f64((capped * jitter).max(0.0))
	}
}

/// Errors that can report whether a retry might succeed.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		self.is_timeout() || self.is_connect() || self.is_request()
	}
}

/// Runs `operation`, retrying retryable failures with exponential backoff.
///
/// Non-retryable errors are returned immediately; once attempts are
/// exhausted the last error is returned.
///
/// # Example
/// ```ignore
/// let response = reel_common_http::retry(&config, || async {
///     client.post(&url).json(&body).send().await
/// })
/// .await?;
/// ```
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
	E: RetryableError + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let max_attempts = config.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(e) if e.is_retryable() && attempt < max_attempts => {
				let backoff = config.backoff_for_attempt(attempt);
				debug!(
					attempt,
					max_attempts,
					backoff_ms = backoff.as_millis() as u64,
					error = %e,
					"Retrying after transient failure"
				);
				tokio::time::sleep(backoff).await;
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	#[derive(Debug)]
	struct TestError {
		retryable: bool,
	}

	impl std::fmt::Display for TestError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "test error (retryable: {})", self.retryable)
		}
	}

	impl RetryableError for TestError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	#[tokio::test(start_paused = true)]
	async fn succeeds_first_try() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = Arc::clone(&calls);

		let result: Result<u32, TestError> = retry(&RetryConfig::default(), || {
			let calls = Arc::clone(&calls_clone);
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Ok(42)
			}
		})
		.await;

		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn retries_transient_failures_until_success() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = Arc::clone(&calls);

		let result: Result<u32, TestError> = retry(&RetryConfig::default(), || {
			let calls = Arc::clone(&calls_clone);
			async move {
				let n = calls.fetch_add(1, Ordering::SeqCst);
				if n < 2 {
					Err(TestError { retryable: true })
				} else {
					Ok(7)
				}
			}
		})
		.await;

		assert_eq!(result.unwrap(), 7);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn gives_up_after_max_attempts() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = Arc::clone(&calls);

		let result: Result<u32, TestError> = retry(&RetryConfig::default(), || {
			let calls = Arc::clone(&calls_clone);
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(TestError { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn non_retryable_error_returns_immediately() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = Arc::clone(&calls);

		let result: Result<u32, TestError> = retry(&RetryConfig::default(), || {
			let calls = Arc::clone(&calls_clone);
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(TestError { retryable: false })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn no_retries_config_tries_once() {
		let calls = Arc::new(AtomicU32::new(0));
		let calls_clone = Arc::clone(&calls);

		let result: Result<u32, TestError> = retry(&RetryConfig::no_retries(), || {
			let calls = Arc::clone(&calls_clone);
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err(TestError { retryable: true })
			}
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn backoff_grows_and_caps() {
		let config = RetryConfig {
			max_attempts: 10,
			initial_backoff: Duration::from_millis(100),
			max_backoff: Duration::from_millis(400),
			backoff_multiplier: 2.0,
			jitter: 0.0,
		};

		assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(100));
		assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(200));
		assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(400));
		assert_eq!(config.backoff_for_attempt(4), Duration::from_millis(400));
	}
}
