use cors_guard::{
    CorsConfig, CorsGuard, CorsSession, ManualClock, Origin, PreflightDispatcher,
    RequestContext, StreamListener,
};
use std::rc::Rc;

pub const REQUESTER: &str = "https://a.example";

pub fn requester() -> Origin {
    Origin::parse(REQUESTER).expect("valid requesting origin")
}

/// Session plus the hand-driven clock behind its cache.
pub struct SessionBuilder {
    config: CorsConfig,
    clock: ManualClock,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: CorsConfig::default(),
            clock: ManualClock::new(),
        }
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn credentials_disabled(mut self) -> Self {
        self.config.credentials_disabled = true;
        self
    }

    pub fn legacy_redirects(mut self) -> Self {
        self.config.intercept_same_uri_redirects = false;
        self
    }

    pub fn build(self) -> (Rc<CorsSession>, ManualClock) {
        let session = CorsSession::with_clock(self.config, Rc::new(self.clock.clone()))
            .expect("valid test configuration");
        (Rc::new(session), self.clock)
    }
}

pub fn session() -> (Rc<CorsSession>, ManualClock) {
    SessionBuilder::new().build()
}

pub fn guard(
    session: &Rc<CorsSession>,
    with_credentials: bool,
    listener: Box<dyn StreamListener>,
) -> CorsGuard {
    let context = RequestContext::new(requester(), with_credentials, session.config());
    CorsGuard::new(Rc::clone(session), context, listener)
}

pub fn dispatcher(session: &Rc<CorsSession>) -> PreflightDispatcher {
    PreflightDispatcher::new(Rc::clone(session))
}
