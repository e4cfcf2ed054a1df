//! JWT credential wrappers, claim decoding, and fail-closed expiry checks.
//!
//! The dispatcher never verifies signatures; it only inspects the `exp` claim embedded in the
//! payload segment to decide whether a refresh is needed before a request leaves the process.
//! Any token that cannot be decoded is treated as expired, so a malformed credential always
//! drives the caller toward the refresh path instead of being sent to the backend as-is.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access/refresh credential pair written together on login and refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Short-lived bearer credential attached to authenticated requests.
	pub access: TokenSecret,
	/// Longer-lived credential used solely to mint new access tokens.
	pub refresh: Option<TokenSecret>,
}
impl TokenPair {
	/// Builds a pair from both credential values.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self { access: TokenSecret::new(access), refresh: Some(TokenSecret::new(refresh)) }
	}

	/// Builds a pair holding only an access token, for backends that never rotate.
	pub fn bearer_only(access: impl Into<String>) -> Self {
		Self { access: TokenSecret::new(access), refresh: None }
	}
}

/// Claims decoded from a JWT payload segment; diagnostics only, never trusted for authorization.
#[derive(Clone, Debug, Deserialize)]
pub struct Claims {
	/// Expiry instant in seconds since the Unix epoch.
	#[serde(default)]
	pub exp: Option<i64>,
	/// Issued-at instant in seconds since the Unix epoch.
	#[serde(default)]
	pub iat: Option<i64>,
	/// Subject identifier.
	#[serde(default)]
	pub sub: Option<String>,
	/// Remaining claims carried through verbatim.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decodes the payload segment of a three-part dot-delimited JWT.
///
/// Returns `None` for anything that is not `<header>.<payload>.<signature>` with a
/// base64url-encoded JSON object in the middle. No signature verification is performed.
pub fn decode(token: &str) -> Option<Claims> {
	let mut segments = token.split('.');
	let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
		(Some(_), Some(payload), Some(_), None) => payload,
		_ => return None,
	};
	let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;

	serde_json::from_slice(&bytes).ok()
}

/// Returns `true` when the token is expired at the provided instant.
///
/// Fail-closed: a token that cannot be decoded, or whose claims omit `exp`, counts as expired.
pub fn is_expired_at(token: &str, now: OffsetDateTime) -> bool {
	match decode(token).and_then(|claims| claims.exp) {
		Some(exp) => now.unix_timestamp() >= exp,
		None => true,
	}
}

/// Convenience helper that checks expiry against the current UTC clock.
pub fn is_expired(token: &str) -> bool {
	is_expired_at(token, OffsetDateTime::now_utc())
}
