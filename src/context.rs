use crate::config::CorsConfig;
use crate::headers::PreflightHeaders;
use crate::origin::Origin;

/// CORS state of one request, from open to completion, across redirects.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub requesting_origin: Origin,
    /// Serialized into the `Origin` header. Replaced by an opaque origin once a
    /// request that is already cross-site is redirected to yet another origin.
    pub origin_header_origin: Origin,
    pub with_credentials: bool,
    pub is_preflight: bool,
    pub preflight_method: String,
    pub preflight_headers: PreflightHeaders,
    /// Set the first time any URI in the redirect chain is cross-origin; never cleared.
    pub has_been_cross_site: bool,
    pub request_approved: bool,
}

impl RequestContext {
    pub fn new(origin: Origin, with_credentials: bool, config: &CorsConfig) -> Self {
        Self {
            origin_header_origin: origin.clone(),
            requesting_origin: origin,
            with_credentials: with_credentials && !config.credentials_disabled,
            is_preflight: false,
            preflight_method: String::new(),
            preflight_headers: PreflightHeaders::default(),
            has_been_cross_site: false,
            request_approved: false,
        }
    }

    /// Context for the synthetic `OPTIONS` request asking about `method` and `headers`.
    pub fn preflight<I, S>(
        origin: Origin,
        with_credentials: bool,
        method: &str,
        headers: I,
        config: &CorsConfig,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            is_preflight: true,
            preflight_method: method.to_owned(),
            preflight_headers: PreflightHeaders::new(headers),
            ..Self::new(origin, with_credentials, config)
        }
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod context_test;
