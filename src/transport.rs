//! Pluggable transport used by the request loop.
//!
//! The loop only needs "send one request, give me a response or an error".
//! Redirects are followed by the loop itself, so any transport must hand back
//! 3xx responses untouched.

use futures::future::BoxFuture;
use std::fmt;

/// Sends a single HTTP request.
///
/// Implemented for [`reqwest::Client`]; tests and embedders can supply their
/// own implementation through [`crate::ClientBuilder::transport`] or per call
/// through [`crate::options::PartialRequestOptions::transport`].
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request`, resolving to the raw response or a transport failure.
    ///
    /// A timeout configured on the request must be enforced by the transport
    /// and reported as an error.
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, reqwest::Result<reqwest::Response>>;
}

impl Transport for reqwest::Client {
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, reqwest::Result<reqwest::Response>> {
        Box::pin(self.execute(request))
    }
}

/// Builds the default `reqwest` transport with automatic redirects disabled.
pub fn default_transport() -> crate::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| crate::Error::Configuration(format!("Failed to build HTTP client: {}", e)))
}
