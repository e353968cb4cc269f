// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server configuration from environment variables.
//!
//! Every knob has a default and a `REEL_SERVER_*` override; a malformed
//! override is a reported error, never a silent fallback.

use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// An environment variable held an unusable value
	#[error("invalid value for {variable}: {message}")]
	Invalid {
		variable: &'static str,
		message: String,
	},
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 4850,
		}
	}
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub url: String,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: "sqlite:./reel.db".to_string(),
		}
	}
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
	/// Default tracing filter when `RUST_LOG` is unset.
	pub level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "reel_server=debug,reel_server_qoe=debug,tower_http=info".to_string(),
		}
	}
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from the environment over built-in defaults.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	let mut config = ServerConfig::default();

	if let Ok(host) = std::env::var("REEL_SERVER_HOST") {
		if host.is_empty() {
			return Err(ConfigError::Invalid {
				variable: "REEL_SERVER_HOST",
				message: "host cannot be empty".to_string(),
			});
		}
		config.http.host = host;
	}

	if let Ok(port) = std::env::var("REEL_SERVER_PORT") {
		config.http.port = port.parse().map_err(|_| ConfigError::Invalid {
			variable: "REEL_SERVER_PORT",
			message: format!("expected a port number, got {port:?}"),
		})?;
	}

	if let Ok(url) = std::env::var("REEL_SERVER_DATABASE_URL") {
		if url.is_empty() {
			return Err(ConfigError::Invalid {
				variable: "REEL_SERVER_DATABASE_URL",
				message: "database URL cannot be empty".to_string(),
			});
		}
		config.database.url = url;
	}

	if let Ok(level) = std::env::var("REEL_SERVER_LOG") {
		config.logging.level = level;
	}

	tracing::debug!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"Server configuration loaded"
	);

	Ok(config)
}
