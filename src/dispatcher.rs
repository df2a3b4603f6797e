use crate::cache::CacheKey;
use crate::channel::{ChannelRef, RedirectCallback, RedirectFlags, RedirectObserver, StreamListener};
use crate::constants::header;
use crate::context::RequestContext;
use crate::guard::CorsGuard;
use crate::headers::{HeaderList, PreflightHeaders, unsafe_header_names};
use crate::origin::Origin;
use crate::result::{CorsError, NetError, Status};
use crate::session::CorsSession;
use crate::util::is_simple_method;
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Which request [`PreflightDispatcher::start`] put in flight.
#[derive(Clone)]
pub enum Dispatched {
    /// The cache already covered the request; it was opened directly.
    Direct(ChannelRef),
    /// An `OPTIONS` request is in flight; the real request opens after it.
    Preflight(ChannelRef),
}

impl Dispatched {
    pub fn channel(&self) -> &ChannelRef {
        match self {
            Dispatched::Direct(channel) | Dispatched::Preflight(channel) => channel,
        }
    }

    pub fn is_preflight(&self) -> bool {
        matches!(self, Dispatched::Preflight(_))
    }
}

pub struct PreflightDispatcher {
    session: Rc<CorsSession>,
}

impl PreflightDispatcher {
    pub fn new(session: Rc<CorsSession>) -> Self {
        Self { session }
    }

    /// Whether a cross-origin request with `method` and author `headers`
    /// needs the server's permission first.
    pub fn requires_preflight(method: &str, headers: &HeaderList) -> bool {
        !is_simple_method(method) || !unsafe_header_names(headers).is_empty()
    }

    /// Opens `request` once the server has approved `method` and
    /// `unsafe_headers` for `origin`, preflighting when the cache cannot vouch
    /// for it.
    pub fn start(
        &self,
        request: &ChannelRef,
        listener: Box<dyn StreamListener>,
        origin: &Origin,
        with_credentials: bool,
        unsafe_headers: &PreflightHeaders,
    ) -> Result<Dispatched, NetError> {
        let config = self.session.config();
        let with_credentials = with_credentials && !config.credentials_disabled;
        let method = request.method();
        let uri = request.uri();

        if origin.may_load(&uri) && origin.may_load(&request.original_uri()) {
            debug!("same-origin {method} {uri} needs no preflight");
            request.open(listener)?;
            return Ok(Dispatched::Direct(Rc::clone(request)));
        }

        let key = CacheKey::new(&uri, origin, with_credentials);
        let cached = self
            .session
            .cache()
            .check_request(&key, &method, unsafe_headers);
        if cached {
            debug!("preflight cache hit for {method} {uri}");
            request.open(listener)?;
            return Ok(Dispatched::Direct(Rc::clone(request)));
        }

        let preflight = request.new_preflight()?;
        preflight.set_redirect_observer(Some(Rc::new(InternalRedirectsOnly)));

        let inner = PreflightListener {
            session: Rc::clone(&self.session),
            request: Rc::clone(request),
            listener: Rc::new(RefCell::new(listener)),
            origin: origin.clone(),
            with_credentials,
        };
        let context = RequestContext::preflight(
            origin.clone(),
            with_credentials,
            &method,
            unsafe_headers.iter(),
            config,
        );
        let guard = CorsGuard::new(Rc::clone(&self.session), context, Box::new(inner));
        guard.init(&preflight, false)?;
        guard.open(&preflight)?;

        debug!("sent preflight for {method} {uri}");
        Ok(Dispatched::Preflight(preflight))
    }
}

/// Listener of the `OPTIONS` request, behind its guard. Owns the real request
/// until it settles.
struct PreflightListener {
    session: Rc<CorsSession>,
    request: ChannelRef,
    listener: Rc<RefCell<Box<dyn StreamListener>>>,
    origin: Origin,
    with_credentials: bool,
}

impl PreflightListener {
    /// Keyed by the real request's URI: an internal redirect may have moved
    /// the `OPTIONS` request elsewhere.
    fn record(&self, preflight: &ChannelRef) {
        let value = |name: &str| preflight.response_header(name).unwrap_or_default();
        self.session.cache().record_preflight_result(
            &self.request.uri(),
            &self.origin,
            self.with_credentials,
            &value(header::ACCESS_CONTROL_ALLOW_METHODS),
            &value(header::ACCESS_CONTROL_ALLOW_HEADERS),
            &value(header::ACCESS_CONTROL_MAX_AGE),
        );
    }

    fn fail_request(&self, error: NetError) {
        warn!("preflight for {} failed: {error}", self.request.uri());
        self.request.cancel(error.clone());
        let mut listener = self.listener.borrow_mut();
        listener.on_start_request(&self.request);
        listener.on_stop_request(&self.request, Err(error));
    }
}

impl StreamListener for PreflightListener {
    fn on_start_request(&mut self, channel: &ChannelRef) {
        let status = match channel.status() {
            Ok(()) => {
                self.record(channel);
                self.request
                    .open(Box::new(SharedListener(Rc::clone(&self.listener))))
            }
            Err(err) => Err(err),
        };

        if let Err(err) = status {
            self.fail_request(err);
        }
    }

    fn on_data_available(&mut self, _channel: &ChannelRef, _data: &[u8]) -> Status {
        Ok(())
    }

    fn on_stop_request(&mut self, _channel: &ChannelRef, _status: Status) {}
}

/// Hands the caller's listener to the real request while the preflight
/// listener keeps a way to report failures to it.
struct SharedListener(Rc<RefCell<Box<dyn StreamListener>>>);

impl StreamListener for SharedListener {
    fn on_start_request(&mut self, channel: &ChannelRef) {
        self.0.borrow_mut().on_start_request(channel);
    }

    fn on_data_available(&mut self, channel: &ChannelRef, data: &[u8]) -> Status {
        self.0.borrow_mut().on_data_available(channel, data)
    }

    fn on_stop_request(&mut self, channel: &ChannelRef, status: Status) {
        self.0.borrow_mut().on_stop_request(channel, status);
    }
}

/// Preflights only follow redirects the network stack makes on its own.
fn check_preflight_redirect(flags: RedirectFlags) -> Result<(), CorsError> {
    if flags.internal {
        Ok(())
    } else {
        Err(CorsError::RedirectNotAllowed)
    }
}

struct InternalRedirectsOnly;

impl RedirectObserver for InternalRedirectsOnly {
    fn on_redirect(
        &self,
        old: &ChannelRef,
        new: &ChannelRef,
        flags: RedirectFlags,
        callback: RedirectCallback,
    ) {
        let verdict = check_preflight_redirect(flags).map_err(|err| {
            warn!(
                "preflight to {} tried to redirect to {}",
                old.uri(),
                new.uri()
            );
            NetError::from(err)
        });
        callback(verdict);
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod dispatcher_test;
