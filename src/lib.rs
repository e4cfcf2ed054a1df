//! Authenticated HTTP dispatcher with transparent, single-flight JWT refresh: bearer injection,
//! fail-closed expiry checks, and shared refresh outcomes for concurrent callers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod client;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod store;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		client::{ApiClient, Endpoints},
		store::{MemoryStore, TokenStore},
		token::TokenPair,
	};

	/// Builds an [`ApiClient`] backed by an in-memory store against the provided mock base URL,
	/// returning the store handle alongside it so tests can seed and inspect credentials.
	pub fn build_test_client(base: &str) -> (ApiClient, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let endpoints =
			Endpoints::new(Url::parse(base).expect("Test base URL should parse successfully."));
		let client =
			ApiClient::new(endpoints, store).expect("Test client should build successfully.");

		(client, store_backend)
	}

	/// Seeds the store with an access/refresh pair for authenticated-request tests.
	pub async fn seed_tokens(store: &MemoryStore, access: &str, refresh: &str) {
		store
			.save(TokenPair::new(access, refresh))
			.await
			.expect("Seeding tokens into the memory store should succeed.");
	}

	/// Forges an unsigned JWT whose `exp` claim lands at the provided instant.
	///
	/// The signature segment is garbage; the dispatcher only inspects the payload.
	pub fn forge_jwt(expires_at: OffsetDateTime) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD
			.encode(format!(r#"{{"exp":{},"sub":"test"}}"#, expires_at.unix_timestamp()));

		format!("{header}.{payload}.sig")
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use bearer_gate as _;
#[cfg(all(test, feature = "reqwest"))] use {httpmock as _, tokio as _};
