//! Resolving the caller identity and route of a request.

use http::header::HeaderName;
use http::Request;

use crate::error::{Result, TurnstileError};

/// Default header carrying the caller identity.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

/// The identity and route a request is limited under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    /// Caller identity; empty when the request carries none.
    pub identity: String,
    /// Route key
    pub route: String,
}

/// Extracts a [`RequestKey`] from an incoming request.
pub trait KeyExtractor: Clone + Send + Sync + 'static {
    /// Resolve the identity and route of `request`.
    fn extract<B>(&self, request: &Request<B>) -> RequestKey;
}

/// Reads the identity from a header and uses the URI path as the route.
#[derive(Debug, Clone)]
pub struct HeaderKeyExtractor {
    header: HeaderName,
}

impl HeaderKeyExtractor {
    /// Read the identity from `header`.
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Read the identity from the header called `name`.
    pub fn from_name(name: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TurnstileError::Config(format!("invalid identity header {:?}: {}", name, e)))?;
        Ok(Self::new(header))
    }

    /// The header the identity is read from.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for HeaderKeyExtractor {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DEFAULT_IDENTITY_HEADER))
    }
}

impl KeyExtractor for HeaderKeyExtractor {
    fn extract<B>(&self, request: &Request<B>) -> RequestKey {
        let identity = request
            .headers()
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let route = request.uri().path().to_string();

        RequestKey { identity, route }
    }
}
