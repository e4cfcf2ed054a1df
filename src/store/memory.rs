//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{SessionInfo, StoreFuture, TokenStore},
	token::{TokenPair, TokenSecret},
};

#[derive(Clone, Debug, Default)]
struct Snapshot {
	tokens: Option<TokenPair>,
	session: Option<SessionInfo>,
}

type SharedSnapshot = Arc<RwLock<Snapshot>>;

/// Thread-safe storage backend that keeps credentials in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(SharedSnapshot);
impl MemoryStore {
	fn access_now(shared: &SharedSnapshot) -> Option<TokenSecret> {
		shared.read().tokens.as_ref().map(|pair| pair.access.clone())
	}

	fn refresh_now(shared: &SharedSnapshot) -> Option<TokenSecret> {
		shared.read().tokens.as_ref().and_then(|pair| pair.refresh.clone())
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		let shared = self.0.clone();

		Box::pin(async move {
			shared.write().tokens = Some(pair);

			Ok(())
		})
	}

	fn access(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let shared = self.0.clone();

		Box::pin(async move { Ok(Self::access_now(&shared)) })
	}

	fn refresh(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let shared = self.0.clone();

		Box::pin(async move { Ok(Self::refresh_now(&shared)) })
	}

	fn save_session(&self, session: SessionInfo) -> StoreFuture<'_, ()> {
		let shared = self.0.clone();

		Box::pin(async move {
			shared.write().session = Some(session);

			Ok(())
		})
	}

	fn session(&self) -> StoreFuture<'_, Option<SessionInfo>> {
		let shared = self.0.clone();

		Box::pin(async move { Ok(shared.read().session.clone()) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let shared = self.0.clone();

		Box::pin(async move {
			*shared.write() = Snapshot::default();

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	#[test]
	fn save_overwrites_and_clear_removes_everything() {
		let store = MemoryStore::default();
		let rt = Runtime::new().expect("Failed to build Tokio runtime for memory store test.");

		rt.block_on(async {
			store
				.save(TokenPair::new("access-1", "refresh-1"))
				.await
				.expect("First save should succeed.");
			store
				.save(TokenPair::new("access-2", "refresh-2"))
				.await
				.expect("Second save should succeed.");
			store
				.save_session(SessionInfo::logged_in(serde_json::json!({"name": "demo"})))
				.await
				.expect("Session save should succeed.");

			let access = store.access().await.expect("Access read should succeed.");

			assert_eq!(access.as_ref().map(TokenSecret::expose), Some("access-2"));

			store.clear().await.expect("Clear should succeed.");

			assert!(store.access().await.expect("Access read should succeed.").is_none());
			assert!(store.refresh().await.expect("Refresh read should succeed.").is_none());
			assert!(store.session().await.expect("Session read should succeed.").is_none());
		});
	}

	#[test]
	fn refresh_is_absent_for_bearer_only_pairs() {
		let store = MemoryStore::default();
		let rt = Runtime::new().expect("Failed to build Tokio runtime for memory store test.");

		rt.block_on(async {
			store
				.save(TokenPair::bearer_only("lonely-access"))
				.await
				.expect("Save should succeed.");

			assert!(store.refresh().await.expect("Refresh read should succeed.").is_none());
		});
	}
}
