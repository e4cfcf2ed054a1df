//! Single-flight token refresh with fan-out of the episode outcome.
//!
//! [`RefreshCoordinator`] owns the Idle/Refreshing state machine. At most one refresh episode
//! runs at a time: the first caller that needs new credentials acquires the flight guard and
//! performs the exchange through the injected [`TokenRefresher`]; callers arriving while the
//! episode is in flight park on the guard and, once through, adopt the episode's outcome from
//! the store instead of starting their own exchange. A failed episode clears the store and
//! surfaces the same [`Error::AuthExpired`] to every parked caller: session teardown, no retry.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "reqwest")] use std::time::Duration as StdDuration;
// self
#[cfg(feature = "reqwest")]
use crate::{error::TransportError, http::ReqwestHttpClient};
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
	token::{TokenPair, TokenSecret},
};

/// Boxed future returned by [`TokenRefresher::exchange`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenGrant>> + 'a + Send>>;

/// External collaborator that exchanges a refresh token for a new credential pair.
///
/// Injected at construction time so the coordinator never reaches into ambient state to find
/// its backend, and tests can substitute a scripted implementation.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Performs one token exchange against the backend.
	fn exchange<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// Token pair returned by the backend's login and refresh endpoints.
///
/// Accepts both snake_case and camelCase field spellings. Unknown fields are retained so the
/// login flow can persist them as the session's user profile blob.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
	/// Newly minted access token.
	#[serde(alias = "accessToken")]
	pub access_token: String,
	/// Rotated refresh token; absent when the backend does not rotate on every exchange.
	#[serde(default, alias = "refreshToken")]
	pub refresh_token: Option<String>,
	/// Remaining response fields (user profile, display name, ...).
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("extra", &self.extra)
			.finish()
	}
}

/// Coordinator state observable between episodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
	/// No refresh in flight.
	Idle,
	/// A refresh episode is running; new callers park until it settles.
	Refreshing,
}

/// Why a caller is asking for new credentials.
#[derive(Clone, Debug)]
pub enum RefreshTrigger {
	/// The stored access token decoded as expired before the request was sent.
	Expired {
		/// The token value the caller observed as expired.
		observed: String,
	},
	/// The backend answered 401 despite the attached (or absent) token.
	Rejected {
		/// The token value the backend rejected, when one was attached.
		observed: Option<String>,
	},
}
impl RefreshTrigger {
	fn observed(&self) -> Option<&str> {
		match self {
			Self::Expired { observed } => Some(observed),
			Self::Rejected { observed } => observed.as_deref(),
		}
	}
}

/// Thread-safe counters for refresh episodes.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of refresh requests (including adopted outcomes).
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that completed with fresh credentials.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that ended the session.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}

/// Single-flight refresh state machine shared by every dispatcher clone.
pub struct RefreshCoordinator {
	store: Arc<dyn TokenStore>,
	refresher: Arc<dyn TokenRefresher>,
	flight: AsyncMutex<()>,
	phase: Mutex<RefreshPhase>,
	// Reason of the most recent failed episode, cleared by the next successful exchange.
	// Parked callers re-derive the failure from the cleared store and pick this up so the
	// fan-out carries the episode's actual reason.
	episode_failure: Mutex<Option<String>>,
	metrics: RefreshMetrics,
}
impl RefreshCoordinator {
	/// Creates a coordinator over the provided store and refresh collaborator.
	pub fn new(store: Arc<dyn TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
		Self {
			store,
			refresher,
			flight: AsyncMutex::new(()),
			phase: Mutex::new(RefreshPhase::Idle),
			episode_failure: Mutex::new(None),
			metrics: RefreshMetrics::default(),
		}
	}

	/// Returns the current coordinator phase.
	pub fn phase(&self) -> RefreshPhase {
		*self.phase.lock()
	}

	/// Returns `true` while a refresh episode is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.phase() == RefreshPhase::Refreshing
	}

	/// Returns the episode counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Produces an access token that supersedes the one the caller observed as unusable.
	///
	/// Parks behind any in-flight episode; if that episode already replaced the observed token,
	/// its result is adopted without a second exchange. Otherwise this caller becomes the
	/// episode and performs exactly one exchange through the collaborator.
	pub async fn fresh_access(&self, trigger: RefreshTrigger) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "fresh_access");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.metrics.record_attempt();

				let _flight = self.flight.lock().await;

				if let Some(current) = self
					.store
					.access()
					.await?
					.filter(|current| Self::already_settled(current, &trigger))
				{
					self.metrics.record_success();

					return Ok(current);
				}

				match self.exchange_once().await {
					Ok(access) => {
						self.metrics.record_success();

						Ok(access)
					},
					Err(err) => {
						self.metrics.record_failure();

						Err(err)
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// A prior episode settled this caller's request if the stored token no longer matches the
	/// one it observed as expired/rejected. Callers that never held a token always exchange.
	///
	/// Adoption compares token values, so a backend that re-issues a byte-identical access
	/// token makes a parked caller run its own exchange. Rotating backends never hit this.
	fn already_settled(current: &TokenSecret, trigger: &RefreshTrigger) -> bool {
		trigger.observed().is_some_and(|observed| current.expose() != observed)
	}

	async fn exchange_once(&self) -> Result<TokenSecret> {
		*self.phase.lock() = RefreshPhase::Refreshing;

		let outcome = self.run_exchange().await;

		*self.phase.lock() = RefreshPhase::Idle;

		outcome
	}

	async fn run_exchange(&self) -> Result<TokenSecret> {
		let Some(refresh) = self.store.refresh().await? else {
			// An empty store right behind a failed episode means this caller parked on it;
			// repeat that episode's reason instead of the generic empty-store message.
			let reason = self
				.episode_failure
				.lock()
				.clone()
				.unwrap_or_else(|| "no refresh token is available".into());

			return self.fail_session(&reason).await;
		};
		let grant = match self.refresher.exchange(refresh.expose()).await {
			Ok(grant) => grant,
			Err(err) => return self.fail_session(&err.to_string()).await,
		};
		let access = TokenSecret::new(grant.access_token);
		// Backends that do not rotate keep the prior refresh token valid.
		let next_refresh = grant.refresh_token.map(TokenSecret::new).unwrap_or(refresh);

		self.store
			.save(TokenPair { access: access.clone(), refresh: Some(next_refresh) })
			.await?;
		*self.episode_failure.lock() = None;

		Ok(access)
	}

	async fn fail_session(&self, reason: &str) -> Result<TokenSecret> {
		*self.episode_failure.lock() = Some(reason.to_owned());

		let _ = self.store.clear().await;

		Err(Error::AuthExpired { reason: reason.into() })
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("phase", &self.phase())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Reqwest-backed [`TokenRefresher`] posting the refresh token to a configured endpoint.
///
/// Carries a bounded request timeout so a hung refresh call completes the episode as a failure
/// instead of stalling every parked caller indefinitely.
#[cfg(feature = "reqwest")]
pub struct HttpTokenRefresher {
	http_client: ReqwestHttpClient,
	endpoint: Url,
	timeout: Option<StdDuration>,
}
#[cfg(feature = "reqwest")]
impl HttpTokenRefresher {
	/// Default bound on one refresh exchange.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Creates a refresher against the provided endpoint with the default timeout.
	pub fn new(http_client: ReqwestHttpClient, endpoint: Url) -> Self {
		Self { http_client, endpoint, timeout: Some(Self::DEFAULT_TIMEOUT) }
	}

	/// Overrides the exchange timeout; `None` defers entirely to the transport.
	pub fn with_timeout(mut self, timeout: Option<StdDuration>) -> Self {
		self.timeout = timeout;

		self
	}
}
#[cfg(feature = "reqwest")]
impl TokenRefresher for HttpTokenRefresher {
	fn exchange<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
		Box::pin(async move {
			let mut builder = self
				.http_client
				.post(self.endpoint.clone())
				.json(&serde_json::json!({ "refresh_token": refresh_token }));

			if let Some(timeout) = self.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status();
			let bytes = response.bytes().await.map_err(TransportError::from)?;

			if !status.is_success() {
				return Err(Error::Api {
					status: status.as_u16(),
					message: crate::http::error_message(&bytes, status),
				});
			}

			let mut deserializer = serde_json::Deserializer::from_slice(&bytes);

			serde_path_to_error::deserialize(&mut deserializer)
				.map_err(|source| Error::GrantParse { source })
		})
	}
}
#[cfg(feature = "reqwest")]
impl Debug for HttpTokenRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpTokenRefresher")
			.field("endpoint", &self.endpoint.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}
