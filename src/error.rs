//! Dispatcher-level error types shared across the client, coordinator, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical dispatcher error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Backend rejected the request with a non-2xx status and a parseable envelope.
	#[error("Backend returned status {status}: {message}.")]
	Api {
		/// HTTP status code of the failed response.
		status: u16,
		/// Server-provided `detail`/`message` payload, or the HTTP status line.
		message: String,
	},
	/// Credentials expired or were rejected and could not be refreshed.
	///
	/// Terminal for the current session; every caller parked behind the failed refresh receives
	/// this same rejection and the token store has already been cleared.
	#[error("Authentication expired: {reason}.")]
	AuthExpired {
		/// Human-readable summary of why the session ended.
		reason: String,
	},
	/// Token grant response could not be parsed.
	#[error("Token grant response could not be parsed.")]
	GrantParse {
		/// Structured parsing failure with JSON path context.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns `true` when the error signals a dead session that must not be retried.
	pub fn is_auth_expired(&self) -> bool {
		matches!(self, Self::AuthExpired { .. })
	}
}

/// Configuration and validation failures raised before any request leaves the process.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Relative path could not be joined onto the configured base URL.
	#[error("Base URL cannot be joined with `{path}`.")]
	InvalidPath {
		/// Path supplied by the caller.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request payload could not be serialized as JSON.
	#[error("Request payload could not be serialized as JSON.")]
	Payload(#[from] serde_json::Error),
	/// Multipart part carries an invalid MIME type.
	#[error("Multipart part `{name}` has an invalid MIME type.")]
	InvalidMime {
		/// Form field name of the offending part.
		name: String,
		/// Underlying transport failure.
		#[source]
		source: BoxError,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
