use thiserror::Error;

/// Terminal status codes a request can end with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    /// The single status every cross-origin enforcement failure cancels with.
    #[error("request blocked by the cross-origin policy")]
    CorsBlocked,
    #[error("request aborted")]
    Aborted,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("redirect rejected: {0}")]
    Redirect(String),
}

/// Outcome of a request, a read, or a redirect verification.
pub type Status = Result<(), NetError>;

/// Reasons a cross-origin request is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorsError {
    #[error("cross-origin requests are disabled")]
    Disabled,
    #[error("underlying request failed: {0}")]
    TransportFailed(NetError),
    #[error("cross-origin request target is not an HTTP channel")]
    NotHttp,
    #[error("missing Access-Control-Allow-Origin header")]
    MissingAllowOrigin,
    #[error("Access-Control-Allow-Origin does not match the request origin")]
    OriginMismatch,
    #[error("credentialed request without Access-Control-Allow-Credentials: true")]
    MissingAllowCredentials,
    #[error("preflight response did not succeed")]
    PreflightNotSucceeded,
    #[error("invalid token {0:?} in Access-Control-Allow-Methods")]
    InvalidAllowMethod(String),
    #[error("method {0:?} not found in Access-Control-Allow-Methods")]
    MethodNotFound(String),
    #[error("invalid token {0:?} in Access-Control-Allow-Headers")]
    InvalidAllowHeader(String),
    #[error("header {0:?} missing from Access-Control-Allow-Headers")]
    MissingAllowHeaderFromPreflight(String),
    #[error("URI is not acceptable for a cross-origin request")]
    BadUri,
    #[error("loading a {0:?} URI is not permitted from this origin")]
    LoadDenied(String),
    #[error("preflight requests may not follow redirects")]
    RedirectNotAllowed,
}

impl From<CorsError> for NetError {
    fn from(_: CorsError) -> Self {
        NetError::CorsBlocked
    }
}
