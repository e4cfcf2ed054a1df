//! Transport primitives for the dispatcher.
//!
//! [`ReqwestHttpClient`] is the thin transport wrapper shared by the dispatcher and the
//! reqwest-backed refresher. [`RequestBody`] keeps request payloads as owned data (multipart
//! parts included) so the dispatcher's single post-refresh retry can rebuild the outbound
//! request from scratch. [`ApiBody`] is the JSON-or-text success payload handed back to callers.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")]
use reqwest::{
	StatusCode,
	multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::_prelude::*;

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// One instance backs both the dispatcher and the refresher, so connection pools are shared
/// between ordinary API calls and token exchanges.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Outbound request payload held as owned data so a retry can resend it unchanged.
#[derive(Clone, Debug)]
pub enum RequestBody {
	/// No body (GET, DELETE).
	Empty,
	/// JSON body with an explicit `application/json` content type.
	Json(serde_json::Value),
	/// Raw bytes with a caller-supplied content type.
	Raw {
		/// Content type header value for the payload.
		content_type: String,
		/// Payload bytes.
		bytes: Vec<u8>,
	},
	/// Multipart form data. No explicit content type is set so the transport's generated
	/// multipart boundary survives.
	Multipart(Vec<UploadPart>),
}

/// One owned part of a multipart upload.
#[derive(Clone, Debug)]
pub struct UploadPart {
	/// Form field name.
	pub name: String,
	/// File name hint forwarded to the backend, if any.
	pub file_name: Option<String>,
	/// MIME type of the part, if any.
	pub mime: Option<String>,
	/// Part payload.
	pub bytes: Vec<u8>,
}
impl UploadPart {
	/// Builds a plain text form field.
	pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), file_name: None, mime: None, bytes: value.into().into_bytes() }
	}

	/// Builds a file part carrying the provided bytes.
	pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
		Self { name: name.into(), file_name: Some(file_name.into()), mime: None, bytes }
	}

	/// Attaches a MIME type to the part.
	pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
		self.mime = Some(mime.into());

		self
	}
}

/// Successful response payload, parsed as JSON when the backend says so.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiBody {
	/// Body delivered with a JSON content type.
	Json(serde_json::Value),
	/// Anything else, as text.
	Text(String),
}
impl ApiBody {
	/// Deserializes the payload into a typed value.
	pub fn json<T>(self) -> Result<T, serde_json::Error>
	where
		T: DeserializeOwned,
	{
		match self {
			Self::Json(value) => serde_json::from_value(value),
			Self::Text(text) => serde_json::from_str(&text),
		}
	}

	/// Returns the JSON payload, if the response carried one.
	pub fn as_json(&self) -> Option<&serde_json::Value> {
		match self {
			Self::Json(value) => Some(value),
			Self::Text(_) => None,
		}
	}

	/// Consumes the payload into its textual form.
	pub fn into_text(self) -> String {
		match self {
			Self::Json(value) => value.to_string(),
			Self::Text(text) => text,
		}
	}
}

/// Returns `true` when the content type declares a JSON payload.
pub(crate) fn is_json_content_type(value: &str) -> bool {
	value
		.split(';')
		.next()
		.map(str::trim)
		.is_some_and(|media| media.eq_ignore_ascii_case("application/json") || media.ends_with("+json"))
}

/// Extracts a human-readable message from an error body.
///
/// Looks for the `detail` / `message` fields of a JSON envelope and falls back to the HTTP
/// status line when the body has any other shape.
#[cfg(feature = "reqwest")]
pub(crate) fn error_message(bytes: &[u8], status: StatusCode) -> String {
	if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
		for key in ["detail", "message"] {
			if let Some(text) = value.get(key).and_then(serde_json::Value::as_str) {
				return text.to_owned();
			}
		}
	}

	status.canonical_reason().unwrap_or("Unknown error").to_owned()
}

/// Builds a reqwest multipart form from owned parts.
#[cfg(feature = "reqwest")]
pub(crate) fn build_form(parts: &[UploadPart]) -> Result<Form, ConfigError> {
	let mut form = Form::new();

	for part in parts {
		let mut piece = Part::bytes(part.bytes.clone());

		if let Some(file_name) = &part.file_name {
			piece = piece.file_name(file_name.clone());
		}
		if let Some(mime) = &part.mime {
			piece = piece.mime_str(mime).map_err(|e| ConfigError::InvalidMime {
				name: part.name.clone(),
				source: Box::new(e),
			})?;
		}

		form = form.part(part.name.clone(), piece);
	}

	Ok(form)
}
