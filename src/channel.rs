use crate::result::{NetError, Status};
use std::rc::Rc;
use url::Url;

pub type ChannelRef = Rc<dyn Channel>;

/// Continuation handed to a [`RedirectObserver`]; must be called exactly once.
pub type RedirectCallback = Box<dyn FnOnce(Status)>;

/// One HTTP request as seen by the guard.
pub trait Channel {
    /// Current effective URI, after any rewriting.
    fn uri(&self) -> Url;
    /// URI the request was created with.
    fn original_uri(&self) -> Url;
    fn method(&self) -> String;
    /// False for non-HTTP channels (`data:`, `blob:`), which carry no headers.
    fn is_http(&self) -> bool;

    fn set_request_header(&self, name: &str, value: &str);
    fn request_header(&self, name: &str) -> Option<String>;
    /// Suppress cookies and ambient authentication.
    fn set_anonymous(&self);
    fn is_anonymous(&self) -> bool;

    fn response_header(&self, name: &str) -> Option<String>;
    /// HTTP status code of the response, when one was received.
    fn response_status(&self) -> Option<u16>;
    /// Transport-level outcome so far.
    fn status(&self) -> Status;

    fn cancel(&self, error: NetError);
    fn open(&self, listener: Box<dyn StreamListener>) -> Status;

    fn redirect_observer(&self) -> Option<Rc<dyn RedirectObserver>>;
    fn set_redirect_observer(&self, observer: Option<Rc<dyn RedirectObserver>>);

    /// A new `OPTIONS` request for the same URI, sharing this request's load
    /// group and flags.
    fn new_preflight(&self) -> Result<ChannelRef, NetError>;
}

/// Lifecycle notifications of a request.
pub trait StreamListener {
    fn on_start_request(&mut self, channel: &ChannelRef);
    /// An `Err` fails the read and cancels the request.
    fn on_data_available(&mut self, channel: &ChannelRef, data: &[u8]) -> Status;
    fn on_stop_request(&mut self, channel: &ChannelRef, status: Status);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RedirectFlags {
    /// Generated by the network stack rather than by a server response.
    pub internal: bool,
    pub permanent: bool,
}

impl RedirectFlags {
    pub fn internal() -> Self {
        Self {
            internal: true,
            ..Self::default()
        }
    }

    pub fn temporary() -> Self {
        Self::default()
    }

    pub fn permanent() -> Self {
        Self {
            permanent: true,
            ..Self::default()
        }
    }
}

pub trait RedirectObserver {
    /// Either veto the redirect or let it proceed by invoking `callback`,
    /// now or later.
    fn on_redirect(
        &self,
        old: &ChannelRef,
        new: &ChannelRef,
        flags: RedirectFlags,
        callback: RedirectCallback,
    );
}

/// `http://host/...` to `https://host/...` with nothing else changed.
pub fn is_secure_upgrade(old: &Url, new: &Url) -> bool {
    if old.scheme() != "http" || new.scheme() != "https" {
        return false;
    }
    let mut upgraded = old.clone();
    upgraded.set_scheme("https").is_ok() && upgraded == *new
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;
