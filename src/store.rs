//! Storage contracts and built-in backends for client credentials and session metadata.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	token::{TokenPair, TokenSecret},
};

/// Boxed future returned by every [`TokenStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for the client's credential pair and session metadata.
///
/// `clear` removes credentials and session metadata together; it is the teardown invoked on
/// logout and on an unrecoverable refresh failure, after which callers must treat the session
/// as ended.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the credential pair, overwriting any prior values.
	fn save(&self, pair: TokenPair) -> StoreFuture<'_, ()>;

	/// Returns the stored access token, if any.
	fn access(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Returns the stored refresh token, if any.
	fn refresh(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Persists or replaces the session metadata blob.
	fn save_session(&self, session: SessionInfo) -> StoreFuture<'_, ()>;

	/// Returns the stored session metadata, if any.
	fn session(&self) -> StoreFuture<'_, Option<SessionInfo>>;

	/// Removes credentials and session metadata.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Session metadata persisted alongside the credential pair.
///
/// The dispatcher itself never reads this; it exists for the surrounding application (user
/// display, login-state checks) and is torn down together with the tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
	/// Opaque user profile blob returned by the login endpoint.
	pub user_info: serde_json::Value,
	/// Whether a login has completed since the last teardown.
	pub logged_in: bool,
}
impl SessionInfo {
	/// Builds a logged-in session wrapping the provided user profile blob.
	pub fn logged_in(user_info: serde_json::Value) -> Self {
		Self { user_info, logged_in: true }
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
