//! Client-level error types shared across the interceptors, the refresh flow, and stores.

// self
use crate::{_prelude::*, config::ClientConfigError};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const BODY_EXCERPT_LIMIT: usize = 512;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The backend answered with a non-success status.
	#[error(transparent)]
	Status(#[from] StatusError),
	/// Explicit refresh failed; request callers never see this variant.
	#[error(transparent)]
	Refresh(RefreshError),
	/// Response body could not be decoded into the requested type.
	#[error("Response body from {url} could not be decoded.")]
	Decode {
		/// URL of the request whose body failed to decode.
		url: String,
		/// Structured decoding failure carrying the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},

	/// No access token is stored; authentication was never established.
	#[error("Access token is missing.")]
	MissingAccessToken,
	/// No refresh token is stored when a refresh is required.
	#[error("No refresh token found.")]
	MissingRefreshToken,
}
impl Error {
	/// Returns the HTTP status carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status(e) => Some(e.status),
			Self::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when the backend rejected the request with `401 Unauthorized`.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Status(e) if e.is_unauthorized())
	}
}
impl From<RefreshError> for Error {
	fn from(e: RefreshError) -> Self {
		match e {
			RefreshError::MissingRefreshToken => Self::MissingRefreshToken,
			other => Self::Refresh(other),
		}
	}
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] ::http::Error),
	/// Stored access token cannot be encoded as a header value.
	#[error("Access token contains characters that are not valid in a header.")]
	InvalidBearer(#[from] ::http::header::InvalidHeaderValue),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized to JSON.")]
	Serialize(#[from] serde_json::Error),
	/// Client configuration is invalid.
	#[error(transparent)]
	Client(#[from] ClientConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Target URL of the failed call.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Display, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Box::new(src) }
	}
}

/// Non-success HTTP response returned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Request to {url} failed with status {status}.")]
pub struct StatusError {
	/// HTTP status code.
	pub status: u16,
	/// Request URL.
	pub url: String,
	/// Lossy UTF-8 excerpt of the response body.
	pub body: String,
}
impl StatusError {
	/// Builds a status error, truncating the body to a short excerpt.
	pub fn new(status: u16, url: impl Display, body: &[u8]) -> Self {
		let mut body = String::from_utf8_lossy(body).into_owned();

		if body.len() > BODY_EXCERPT_LIMIT {
			let mut cut = BODY_EXCERPT_LIMIT;

			while !body.is_char_boundary(cut) {
				cut -= 1;
			}

			body.truncate(cut);
		}

		Self { status, url: url.to_string(), body }
	}

	/// Returns `true` for `401 Unauthorized`.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}
}

/// Failure of the shared refresh computation.
///
/// Cloneable because one outcome is handed to every waiter of the single-flight refresh.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// No refresh token was stored; no network call was made.
	#[error("No refresh token found.")]
	MissingRefreshToken,
	/// Refresh endpoint answered with a non-success status (including 401).
	#[error("Refresh endpoint rejected the refresh token with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Lossy body excerpt.
		body: String,
	},
	/// Refresh call never produced a response.
	#[error("Refresh endpoint is unreachable: {message}.")]
	Transport {
		/// Rendered transport failure.
		message: String,
	},
	/// Refresh endpoint returned a body that is not a token pair.
	#[error("Refresh endpoint returned a malformed token pair: {message}.")]
	MalformedResponse {
		/// Rendered decoding failure including the JSON path.
		message: String,
	},
	/// Token store could not be read or written during the refresh.
	#[error("Token store failed during refresh: {message}.")]
	Storage {
		/// Rendered store failure.
		message: String,
	},
}
