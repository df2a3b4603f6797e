use crate::channel::{
    Channel, ChannelRef, RedirectCallback, RedirectFlags, RedirectObserver, StreamListener,
    is_secure_upgrade,
};
use crate::constants::{CREDENTIALS_TRUE, WILDCARD, header};
use crate::context::RequestContext;
use crate::origin::Origin;
use crate::result::{CorsError, NetError, Status};
use crate::session::CorsSession;
use crate::util::{equals_ignore_case, is_http_token, is_simple_method, split_tokens};
use log::{debug, warn};
use std::cell::{Ref, RefCell, RefMut};
use std::mem;
use std::rc::{Rc, Weak};
use url::Url;

enum RedirectState {
    Idle,
    /// The outer observer has been consulted and has not answered yet.
    AwaitingOuterVerification {
        old: ChannelRef,
        new: ChannelRef,
        callback: RedirectCallback,
    },
}

struct GuardInner {
    session: Rc<CorsSession>,
    context: RefCell<RequestContext>,
    outer_listener: RefCell<Option<Box<dyn StreamListener>>>,
    outer_redirect: RefCell<Option<Rc<dyn RedirectObserver>>>,
    redirect: RefCell<RedirectState>,
}

/// Cheap to clone; clones drive the same request.
#[derive(Clone)]
pub struct CorsGuard {
    inner: Rc<GuardInner>,
}

impl CorsGuard {
    pub fn new(
        session: Rc<CorsSession>,
        context: RequestContext,
        listener: Box<dyn StreamListener>,
    ) -> Self {
        Self {
            inner: Rc::new(GuardInner {
                session,
                context: RefCell::new(context),
                outer_listener: RefCell::new(Some(listener)),
                outer_redirect: RefCell::new(None),
                redirect: RefCell::new(RedirectState::Idle),
            }),
        }
    }

    /// Takes over redirect observation of `channel`, keeping its previous
    /// observer as the outer one, and prepares the request headers.
    pub fn init(&self, channel: &ChannelRef, allow_data_uri: bool) -> Result<(), CorsError> {
        let outer = channel.redirect_observer();
        *self.inner.outer_redirect.borrow_mut() = outer.clone();
        channel.set_redirect_observer(Some(Rc::new(self.clone())));

        if let Err(err) = self.update_channel(channel, allow_data_uri) {
            warn!("refusing cross-origin request to {}: {err}", channel.uri());
            channel.set_redirect_observer(outer);
            self.inner.outer_redirect.borrow_mut().take();
            self.inner.outer_listener.borrow_mut().take();
            return Err(err);
        }
        Ok(())
    }

    /// Starts `channel` with this guard as its listener.
    pub fn open(&self, channel: &ChannelRef) -> Status {
        channel.open(Box::new(self.clone()))
    }

    pub fn context(&self) -> Ref<'_, RequestContext> {
        self.inner.context.borrow()
    }

    pub fn is_approved(&self) -> bool {
        self.context().request_approved
    }

    pub fn has_been_cross_site(&self) -> bool {
        self.context().has_been_cross_site
    }

    /// Value the next `Origin` request header will carry.
    pub fn origin_header_value(&self) -> String {
        self.context().origin_header_origin.ascii_serialization()
    }

    pub fn is_redirect_pending(&self) -> bool {
        matches!(
            *self.inner.redirect.borrow(),
            RedirectState::AwaitingOuterVerification { .. }
        )
    }

    fn context_mut(&self) -> RefMut<'_, RequestContext> {
        self.inner.context.borrow_mut()
    }

    /// CORS check of a response, run before any of its body is released.
    pub fn on_response_headers_received(&self, channel: &dyn Channel) -> Result<(), CorsError> {
        let context = self.context();
        if !context.has_been_cross_site {
            return Ok(());
        }

        if self.inner.session.config().cors_disabled {
            return Err(CorsError::Disabled);
        }

        channel.status().map_err(CorsError::TransportFailed)?;

        if !channel.is_http() || channel.response_status().is_none() {
            return Err(CorsError::NotHttp);
        }

        let allowed_origin = channel
            .response_header(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .ok_or(CorsError::MissingAllowOrigin)?;
        if (context.with_credentials || allowed_origin != WILDCARD)
            && allowed_origin != context.origin_header_origin.ascii_serialization()
        {
            return Err(CorsError::OriginMismatch);
        }

        if context.with_credentials
            && channel
                .response_header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .as_deref()
                != Some(CREDENTIALS_TRUE)
        {
            return Err(CorsError::MissingAllowCredentials);
        }

        if context.is_preflight {
            check_preflight_response(&context, channel)?;
        }

        Ok(())
    }

    /// Prepares `channel` for the next hop: decides whether the load is cross
    /// site and, if so, sets the `Origin` and preflight request headers.
    pub fn update_channel(&self, channel: &ChannelRef, allow_data_uri: bool) -> Result<(), CorsError> {
        let uri = channel.uri();
        let original = channel.original_uri();

        if allow_data_uri && uri == original && uri.scheme() == "data" {
            return Ok(());
        }

        let mut context = self.context_mut();
        context.requesting_origin.check_load(&uri)?;
        context.requesting_origin.check_load(&original)?;

        if !context.has_been_cross_site
            && context.requesting_origin.may_load(&uri)
            && (uri == original || context.requesting_origin.may_load(&original))
        {
            return Ok(());
        }

        context.has_been_cross_site = true;

        if has_userinfo(&uri) {
            return Err(CorsError::BadUri);
        }
        if !channel.is_http() {
            return Err(CorsError::NotHttp);
        }

        let origin = context.origin_header_origin.ascii_serialization();
        let anonymous = context.is_preflight || !context.with_credentials;
        let preflight = context.is_preflight.then(|| {
            (
                context.preflight_method.clone(),
                context.preflight_headers.joined(),
            )
        });
        drop(context);

        channel.set_request_header(header::ORIGIN, &origin);
        if let Some((method, headers)) = preflight {
            channel.set_request_header(header::ACCESS_CONTROL_REQUEST_METHOD, &method);
            if !headers.is_empty() {
                channel.set_request_header(header::ACCESS_CONTROL_REQUEST_HEADERS, &headers);
            }
        }
        if anonymous {
            channel.set_anonymous();
        }

        debug!("cross-origin request to {uri} with origin {origin}");
        Ok(())
    }

    /// Resumes a redirect after the outer observer answered. Only the first
    /// call per redirect has any effect.
    pub fn on_redirect_verify_callback(&self, result: Status) {
        let state = mem::replace(&mut *self.inner.redirect.borrow_mut(), RedirectState::Idle);
        let RedirectState::AwaitingOuterVerification { old, new, callback } = state else {
            warn!("redirect verification arrived with no redirect pending");
            return;
        };

        let mut result = result;
        if result.is_ok()
            && let Err(err) = self.update_channel(&new, false)
        {
            warn!("blocked redirect to {}: {err}", new.uri());
            result = Err(err.into());
        }

        if let Err(err) = &result {
            old.cancel(err.clone());
        }
        callback(result);
    }

    /// Steps run before the outer observer sees a redirect: validate the
    /// response that redirected, and poison the `Origin` header if an
    /// already cross-site request moves to another origin.
    fn check_redirect(
        &self,
        old: &ChannelRef,
        new: &ChannelRef,
        flags: RedirectFlags,
    ) -> Result<(), CorsError> {
        let old_uri = old.uri();
        let new_uri = new.uri();
        if self.is_exempt_redirect(&old_uri, &new_uri, flags) {
            return Ok(());
        }

        self.on_response_headers_received(&**old)?;

        let mut context = self.context_mut();
        if context.has_been_cross_site && Origin::of(&old_uri) != Origin::of(&new_uri) {
            debug!("redirect from {old_uri} to {new_uri} resets the request origin");
            context.origin_header_origin = Origin::new_opaque();
        }
        Ok(())
    }

    fn is_exempt_redirect(&self, old: &Url, new: &Url, flags: RedirectFlags) -> bool {
        if is_secure_upgrade(old, new) {
            return true;
        }
        flags.internal && (!self.inner.session.config().intercept_same_uri_redirects || old == new)
    }

    fn block(&self, channel: &ChannelRef, err: &CorsError) {
        warn!("blocked cross-origin response from {}: {err}", channel.uri());
        let origin = self.context().requesting_origin.clone();
        self.inner.session.cache().remove_entries(&channel.uri(), &origin);
        channel.cancel(NetError::CorsBlocked);
    }
}

fn check_preflight_response(
    context: &RequestContext,
    channel: &dyn Channel,
) -> Result<(), CorsError> {
    if !channel
        .response_status()
        .is_some_and(|status| (200..300).contains(&status))
    {
        return Err(CorsError::PreflightNotSucceeded);
    }

    let methods = channel
        .response_header(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap_or_default();
    let mut found_method = is_simple_method(&context.preflight_method);
    for method in split_tokens(&methods) {
        if !is_http_token(method) {
            return Err(CorsError::InvalidAllowMethod(method.to_owned()));
        }
        found_method |= method == context.preflight_method;
    }
    if !found_method {
        return Err(CorsError::MethodNotFound(context.preflight_method.clone()));
    }

    let headers = channel
        .response_header(header::ACCESS_CONTROL_ALLOW_HEADERS)
        .unwrap_or_default();
    let mut allowed_headers = Vec::new();
    for allowed in split_tokens(&headers) {
        if !is_http_token(allowed) {
            return Err(CorsError::InvalidAllowHeader(allowed.to_owned()));
        }
        allowed_headers.push(allowed);
    }
    for requested in context.preflight_headers.iter() {
        if !allowed_headers
            .iter()
            .any(|allowed| equals_ignore_case(allowed, requested))
        {
            return Err(CorsError::MissingAllowHeaderFromPreflight(
                requested.to_owned(),
            ));
        }
    }

    Ok(())
}

fn has_userinfo(uri: &Url) -> bool {
    !uri.username().is_empty() || uri.password().is_some()
}

impl StreamListener for CorsGuard {
    fn on_start_request(&mut self, channel: &ChannelRef) {
        let verdict = self.on_response_headers_received(&**channel);
        self.context_mut().request_approved = verdict.is_ok();
        if let Err(err) = &verdict {
            self.block(channel, err);
        }

        let mut outer = self.inner.outer_listener.borrow_mut();
        if let Some(listener) = outer.as_mut() {
            listener.on_start_request(channel);
        }
    }

    fn on_data_available(&mut self, channel: &ChannelRef, data: &[u8]) -> Status {
        if !self.is_approved() {
            return Err(NetError::CorsBlocked);
        }

        let mut outer = self.inner.outer_listener.borrow_mut();
        match outer.as_mut() {
            Some(listener) => listener.on_data_available(channel, data),
            None => Ok(()),
        }
    }

    fn on_stop_request(&mut self, channel: &ChannelRef, status: Status) {
        let outer = self.inner.outer_listener.borrow_mut().take();
        self.inner.outer_redirect.borrow_mut().take();
        match outer {
            Some(mut listener) => listener.on_stop_request(channel, status),
            None => debug!("stop notification for {} already delivered", channel.uri()),
        }
    }
}

impl RedirectObserver for CorsGuard {
    fn on_redirect(
        &self,
        old: &ChannelRef,
        new: &ChannelRef,
        flags: RedirectFlags,
        callback: RedirectCallback,
    ) {
        if self.is_redirect_pending() {
            warn!("redirect from {} while another is pending", old.uri());
            callback(Err(NetError::Redirect("redirect already pending".into())));
            return;
        }

        if let Err(err) = self.check_redirect(old, new, flags) {
            self.block(old, &err);
            callback(Err(err.into()));
            return;
        }

        *self.inner.redirect.borrow_mut() = RedirectState::AwaitingOuterVerification {
            old: Rc::clone(old),
            new: Rc::clone(new),
            callback,
        };

        let outer = self.inner.outer_redirect.borrow().clone();
        match outer {
            Some(outer) => {
                let guard: Weak<GuardInner> = Rc::downgrade(&self.inner);
                outer.on_redirect(
                    old,
                    new,
                    flags,
                    Box::new(move |result| {
                        if let Some(inner) = guard.upgrade() {
                            CorsGuard { inner }.on_redirect_verify_callback(result);
                        }
                    }),
                );
            }
            None => self.on_redirect_verify_callback(Ok(())),
        }
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;
