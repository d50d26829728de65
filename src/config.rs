//! Validated client configuration: API base URL and refresh endpoint.

// self
use crate::_prelude::*;

/// Path joined onto the base URL when no refresh endpoint is configured.
pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh";

/// Errors raised while constructing or using a [`ClientConfig`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ClientConfigError {
	/// URL cannot act as a base for relative paths (e.g. `mailto:`).
	#[error("The {endpoint} URL cannot be used as a base: {url}.")]
	NotABase {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Endpoints must use HTTPS unless insecure HTTP is explicitly allowed.
	#[error("The {endpoint} URL must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Only `http` and `https` are supported.
	#[error("The {endpoint} URL uses an unsupported scheme: {url}.")]
	UnsupportedScheme {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// Relative path could not be joined onto the base URL.
	#[error("Path `{path}` cannot be joined onto the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Immutable configuration consumed by [`AuthClient`](crate::client::AuthClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL every relative request path is joined onto. Always ends with `/`.
	pub base_url: Url,
	/// Endpoint that exchanges a refresh token for a new pair.
	pub refresh_endpoint: Url,
	/// Whether plain `http` URLs were accepted (local development and tests).
	pub allow_insecure_http: bool,
}
impl ClientConfig {
	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Resolves a request path against the base URL.
	///
	/// Leading slashes are ignored so `/cv/1` stays under a base URL with a path prefix.
	pub fn endpoint(&self, path: &str) -> Result<Url, ClientConfigError> {
		let relative = path.trim_start_matches('/');

		self.base_url
			.join(relative)
			.map_err(|source| ClientConfigError::InvalidPath { path: path.to_owned(), source })
	}

	/// Returns `true` when `url` addresses the refresh endpoint (query and fragment ignored).
	pub fn is_refresh_endpoint(&self, url: &Url) -> bool {
		url.scheme() == self.refresh_endpoint.scheme()
			&& url.host_str() == self.refresh_endpoint.host_str()
			&& url.port_or_known_default() == self.refresh_endpoint.port_or_known_default()
			&& url.path().trim_end_matches('/') == self.refresh_endpoint.path().trim_end_matches('/')
	}

	fn validate(&self) -> Result<(), ClientConfigError> {
		validate_url("base", &self.base_url, self.allow_insecure_http)?;
		validate_url("refresh", &self.refresh_endpoint, self.allow_insecure_http)?;

		Ok(())
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Base URL for relative request paths.
	pub base_url: Url,
	/// Explicit refresh endpoint; defaults to [`DEFAULT_REFRESH_PATH`] under the base URL.
	pub refresh_endpoint: Option<Url>,
	/// Accept plain `http` URLs.
	pub allow_insecure_http: bool,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self { base_url, refresh_endpoint: None, allow_insecure_http: false }
	}

	/// Overrides the refresh endpoint.
	pub fn refresh_endpoint(mut self, url: Url) -> Self {
		self.refresh_endpoint = Some(url);

		self
	}

	/// Allows plain `http` URLs.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.allow_insecure_http = allow;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let mut base_url = self.base_url;

		if base_url.cannot_be_a_base() {
			return Err(ClientConfigError::NotABase {
				endpoint: "base",
				url: base_url.to_string(),
			});
		}
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		let refresh_endpoint = match self.refresh_endpoint {
			Some(url) => url,
			None => base_url.join(DEFAULT_REFRESH_PATH).map_err(|source| {
				ClientConfigError::InvalidPath { path: DEFAULT_REFRESH_PATH.into(), source }
			})?,
		};
		let config =
			ClientConfig { base_url, refresh_endpoint, allow_insecure_http: self.allow_insecure_http };

		config.validate()?;

		Ok(config)
	}
}

fn validate_url(
	name: &'static str,
	url: &Url,
	allow_insecure_http: bool,
) -> Result<(), ClientConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if allow_insecure_http => Ok(()),
		"http" => Err(ClientConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
		_ => Err(ClientConfigError::UnsupportedScheme { endpoint: name, url: url.to_string() }),
	}
}
