//! Authenticated request dispatcher and session flows.
//!
//! [`ApiClient`] performs one logical request per call: it resolves the path against the
//! configured base URL, decides whether the target is exempt from bearer handling, attaches a
//! fresh access token (refreshing through the [`RefreshCoordinator`] first when the stored one
//! has expired), and replays the request exactly once after a reactive 401 refresh. A second
//! 401 after a successful refresh surfaces as [`Error::AuthExpired`] so a misbehaving backend
//! can never trap the client in a refresh loop.

// crates.io
#[cfg(feature = "reqwest")]
use reqwest::{Method, Response, StatusCode, header::CONTENT_TYPE};
// self
#[cfg(feature = "reqwest")]
use crate::{
	error::TransportError,
	http::{ApiBody, ReqwestHttpClient, RequestBody, UploadPart},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{
		HttpTokenRefresher, RefreshCoordinator, RefreshMetrics, RefreshTrigger, TokenGrant,
		TokenRefresher,
	},
	store::{SessionInfo, TokenStore},
	token::{self, TokenPair, TokenSecret},
};
use crate::{_prelude::*, error::ConfigError};

/// Backend endpoint layout: base URL, session paths, and the auth-exemption allow-list.
///
/// Paths on the allow-list never receive an `Authorization` header and never trigger refresh
/// logic; without this exemption the refresh call itself would recurse into the refresh path.
/// The list defaults to the configured login/refresh/register paths and can be overridden
/// wholesale, since hard-coding it is exactly how the exemption silently breaks when endpoint
/// names drift.
#[derive(Clone, Debug)]
pub struct Endpoints {
	/// Base URL every relative path is resolved against.
	pub base: Url,
	/// Login path exchanging credentials for a token pair.
	pub login: String,
	/// Refresh path exchanging a refresh token for a new pair.
	pub refresh: String,
	/// User-creation path.
	pub register: String,
	auth_exempt: Option<Vec<String>>,
}
impl Endpoints {
	/// Creates an endpoint layout with conventional session paths.
	pub fn new(base: Url) -> Self {
		Self {
			base,
			login: "/auth/login".into(),
			refresh: "/auth/refresh".into(),
			register: "/auth/register".into(),
			auth_exempt: None,
		}
	}

	/// Overrides the login path.
	pub fn with_login(mut self, path: impl Into<String>) -> Self {
		self.login = path.into();

		self
	}

	/// Overrides the refresh path.
	pub fn with_refresh(mut self, path: impl Into<String>) -> Self {
		self.refresh = path.into();

		self
	}

	/// Overrides the user-creation path.
	pub fn with_register(mut self, path: impl Into<String>) -> Self {
		self.register = path.into();

		self
	}

	/// Replaces the derived auth-exemption list with an explicit one.
	pub fn with_auth_exempt<I, S>(mut self, patterns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.auth_exempt = Some(patterns.into_iter().map(Into::into).collect());

		self
	}

	/// Returns `true` when the path matches the auth-exemption list by substring.
	pub fn is_auth_exempt(&self, path: &str) -> bool {
		match &self.auth_exempt {
			Some(patterns) => patterns.iter().any(|pattern| path.contains(pattern.as_str())),
			None => [&self.login, &self.refresh, &self.register]
				.into_iter()
				.any(|pattern| path.contains(pattern.as_str())),
		}
	}

	/// Resolves a path against the base URL; absolute URLs pass through untouched.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		if let Ok(absolute) = Url::parse(path) {
			return Ok(absolute);
		}

		self.base
			.join(path)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}
}

/// Authenticated HTTP dispatcher over a reqwest transport.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ApiClient {
	http_client: ReqwestHttpClient,
	endpoints: Endpoints,
	store: Arc<dyn TokenStore>,
	coordinator: Arc<RefreshCoordinator>,
}
#[cfg(feature = "reqwest")]
impl ApiClient {
	/// Creates a client that provisions its own reqwest transport and HTTP refresher.
	pub fn new(endpoints: Endpoints, store: Arc<dyn TokenStore>) -> Result<Self> {
		Self::with_http_client(endpoints, store, ReqwestHttpClient::default())
	}

	/// Creates a client over a caller-provided transport, deriving the refresher from the
	/// configured refresh endpoint.
	pub fn with_http_client(
		endpoints: Endpoints,
		store: Arc<dyn TokenStore>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let refresh_url = endpoints.resolve(&endpoints.refresh)?;
		let refresher: Arc<dyn TokenRefresher> =
			Arc::new(HttpTokenRefresher::new(http_client.clone(), refresh_url));

		Ok(Self::with_refresher(endpoints, store, http_client, refresher))
	}

	/// Creates a client with an explicitly injected refresh collaborator.
	pub fn with_refresher(
		endpoints: Endpoints,
		store: Arc<dyn TokenStore>,
		http_client: ReqwestHttpClient,
		refresher: Arc<dyn TokenRefresher>,
	) -> Self {
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), refresher));

		Self { http_client, endpoints, store, coordinator }
	}

	/// Returns the endpoint layout.
	pub fn endpoints(&self) -> &Endpoints {
		&self.endpoints
	}

	/// Returns the shared token store.
	pub fn store(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Returns the shared refresh coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Returns the refresh episode counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	/// Performs one logical request with authentication applied.
	pub async fn request(
		&self,
		method: Method,
		path: &str,
		body: RequestBody,
	) -> Result<ApiBody> {
		const KIND: FlowKind = FlowKind::Dispatch;

		let span = FlowSpan::new(KIND, "request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(method, path, body)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// GET without a body.
	pub async fn get(&self, path: &str) -> Result<ApiBody> {
		self.request(Method::GET, path, RequestBody::Empty).await
	}

	/// POST with a JSON body.
	pub async fn post_json<P>(&self, path: &str, payload: &P) -> Result<ApiBody>
	where
		P: ?Sized + Serialize,
	{
		let value = serde_json::to_value(payload).map_err(ConfigError::Payload)?;

		self.request(Method::POST, path, RequestBody::Json(value)).await
	}

	/// PUT with a JSON body.
	pub async fn put_json<P>(&self, path: &str, payload: &P) -> Result<ApiBody>
	where
		P: ?Sized + Serialize,
	{
		let value = serde_json::to_value(payload).map_err(ConfigError::Payload)?;

		self.request(Method::PUT, path, RequestBody::Json(value)).await
	}

	/// POST raw bytes under a caller-supplied content type.
	pub async fn post_raw(
		&self,
		path: &str,
		content_type: impl Into<String>,
		bytes: Vec<u8>,
	) -> Result<ApiBody> {
		let body = RequestBody::Raw { content_type: content_type.into(), bytes };

		self.request(Method::POST, path, body).await
	}

	/// DELETE without a body.
	pub async fn delete(&self, path: &str) -> Result<ApiBody> {
		self.request(Method::DELETE, path, RequestBody::Empty).await
	}

	/// POST a multipart upload. No explicit content type is attached so the transport's
	/// generated multipart boundary is preserved.
	pub async fn upload(&self, path: &str, parts: Vec<UploadPart>) -> Result<ApiBody> {
		self.request(Method::POST, path, RequestBody::Multipart(parts)).await
	}

	/// Exchanges login credentials for a token pair and persists the session.
	///
	/// The login endpoint is auth-exempt, so no bearer header is attached and a rejection is
	/// surfaced as a plain [`Error::Api`] instead of triggering refresh logic. Grant fields
	/// beyond the token pair are stored as the session's user profile blob.
	pub async fn login<P>(&self, credentials: &P) -> Result<SessionInfo>
	where
		P: ?Sized + Serialize,
	{
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let login_path = self.endpoints.login.clone();
				let body = self.post_json(&login_path, credentials).await?;
				let grant = parse_grant(body)?;
				let pair = TokenPair {
					access: TokenSecret::new(grant.access_token),
					refresh: grant.refresh_token.map(TokenSecret::new),
				};
				let session =
					SessionInfo::logged_in(serde_json::Value::Object(grant.extra));

				self.store.save(pair).await?;
				self.store.save_session(session.clone()).await?;

				Ok(session)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Ends the session locally by clearing stored credentials and session metadata.
	pub async fn logout(&self) -> Result<()> {
		self.store.clear().await?;

		Ok(())
	}

	async fn dispatch(&self, method: Method, path: &str, body: RequestBody) -> Result<ApiBody> {
		let url = self.endpoints.resolve(path)?;
		let exempt = self.endpoints.is_auth_exempt(url.path());
		let mut bearer = if exempt { None } else { self.fresh_bearer().await? };
		let mut retried = false;

		loop {
			let response = self.send(method.clone(), url.clone(), &body, bearer.as_ref()).await?;
			let status = response.status();

			if status == StatusCode::UNAUTHORIZED && !exempt {
				if retried {
					return Err(Error::AuthExpired {
						reason: "backend rejected the refreshed access token".into(),
					});
				}

				retried = true;

				let rejected = bearer.take().map(|secret| secret.expose().to_owned());

				bearer = Some(
					self.coordinator
						.fresh_access(RefreshTrigger::Rejected { observed: rejected })
						.await?,
				);

				continue;
			}

			return read_body(response).await;
		}
	}

	/// Reads the stored access token and refreshes it proactively when it decodes as expired.
	/// An absent token means the request goes out unauthenticated.
	async fn fresh_bearer(&self) -> Result<Option<TokenSecret>> {
		match self.store.access().await? {
			None => Ok(None),
			Some(secret) if token::is_expired(secret.expose()) => {
				let observed = secret.expose().to_owned();

				Ok(Some(
					self.coordinator
						.fresh_access(RefreshTrigger::Expired { observed })
						.await?,
				))
			},
			Some(secret) => Ok(Some(secret)),
		}
	}

	async fn send(
		&self,
		method: Method,
		url: Url,
		body: &RequestBody,
		bearer: Option<&TokenSecret>,
	) -> Result<Response> {
		let mut builder = self.http_client.request(method, url);

		if let Some(secret) = bearer {
			builder = builder.bearer_auth(secret.expose());
		}

		builder = match body {
			RequestBody::Empty => builder,
			RequestBody::Json(value) => builder.json(value),
			RequestBody::Raw { content_type, bytes } =>
				builder.header(CONTENT_TYPE, content_type.as_str()).body(bytes.clone()),
			RequestBody::Multipart(parts) => builder.multipart(crate::http::build_form(parts)?),
		};

		builder.send().await.map_err(|e| TransportError::from(e).into())
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("endpoints", &self.endpoints)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn parse_grant(body: ApiBody) -> Result<TokenGrant> {
	match body {
		ApiBody::Json(value) =>
			serde_path_to_error::deserialize(value).map_err(|source| Error::GrantParse { source }),
		ApiBody::Text(text) => {
			let mut deserializer = serde_json::Deserializer::from_str(&text);

			serde_path_to_error::deserialize(&mut deserializer)
				.map_err(|source| Error::GrantParse { source })
		},
	}
}

#[cfg(feature = "reqwest")]
async fn read_body(response: Response) -> Result<ApiBody> {
	let status = response.status();
	let content_type = response
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default()
		.to_owned();
	let bytes = response.bytes().await.map_err(TransportError::from)?;

	if !status.is_success() {
		return Err(Error::Api {
			status: status.as_u16(),
			message: crate::http::error_message(&bytes, status),
		});
	}
	if crate::http::is_json_content_type(&content_type)
		&& let Ok(value) = serde_json::from_slice(&bytes)
	{
		return Ok(ApiBody::Json(value));
	}

	Ok(ApiBody::Text(String::from_utf8_lossy(&bytes).into_owned()))
}
