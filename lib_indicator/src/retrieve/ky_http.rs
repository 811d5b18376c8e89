//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest` with exponential
//! backoff retries and standardized JSON response handling.

use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use url::Url;

/// Transient failures are retried this many times before giving up.
const MAX_RETRIES: u32 = 3;

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with metadata about the HTTP transaction.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

impl<T> ApiResponse<T> {
    /// Turns a non-2xx response (or a 2xx without body) into an error.
    pub fn into_data(self, path: &str) -> anyhow::Result<T> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => anyhow::bail!(
                "GET {} failed with status {}: {}",
                path,
                self.status,
                self.error_body.unwrap_or_default()
            ),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Handles the base URL, the authorization header and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// Value sent verbatim in the `authorization` header.
    authorization: Option<HeaderValue>,
}

impl ApiClient {
    /// Creates a new `ApiClient` with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - Absolute base URL; keep the trailing slash so relative
    ///   paths join below it (e.g. "https://api.apparyllis.com/v1/").
    /// * `authorization` - Raw `authorization` header value, sent without any scheme prefix.
    ///
    /// # Errors
    /// Fails if the base URL is not absolute or the token is not a valid header value.
    pub fn new(base_url: &str, authorization: Option<&str>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid base URL '{}'", base_url))?;

        let mut authorization = authorization
            .map(HeaderValue::from_str)
            .transpose()
            .context("authorization token is not a valid header value")?;
        if let Some(value) = authorization.as_mut() {
            value.set_sensitive(true);
        }

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let inner = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            base_url,
            authorization,
        })
    }

    /// The base URL paths are joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a body-less HTTP request and handles the response.
    ///
    /// Non-2xx statuses do not error: they come back with `success == false`
    /// and the raw body in `error_body`.
    ///
    /// # Errors
    /// URL joining, network execution or body deserialization failures.
    pub async fn request<T: DeserializeOwned>(&self, method: Method, path: &str) -> anyhow::Result<ApiResponse<T>> {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if let Some(value) = &self.authorization {
            req = req.header(AUTHORIZATION, value.clone());
        }

        let response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            let data = response
                .json::<T>()
                .await
                .with_context(|| format!("unexpected payload shape from {}", path))?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
            })
        }
    }

    /// `GET path`, requiring a 2xx with a body that decodes as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        self.request::<T>(Method::GET, path)
            .await?
            .into_data(path)
    }
}
