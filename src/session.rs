use crate::cache::PreflightCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{CorsConfig, ValidationError};
use log::debug;
use once_cell::unsync::OnceCell;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

thread_local! {
    static GLOBAL_SESSION: OnceCell<Rc<CorsSession>> = const { OnceCell::new() };
}

/// Process-wide CORS state shared by every guard and dispatcher: the
/// configuration, the clock and the preflight cache.
pub struct CorsSession {
    config: CorsConfig,
    clock: Rc<dyn Clock>,
    cache: RefCell<PreflightCache>,
}

impl CorsSession {
    pub fn new(config: CorsConfig) -> Result<Self, ValidationError> {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    pub fn with_clock(config: CorsConfig, clock: Rc<dyn Clock>) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self::from_parts(config, clock))
    }

    fn from_parts(config: CorsConfig, clock: Rc<dyn Clock>) -> Self {
        let cache = PreflightCache::new(&config, Rc::clone(&clock));
        Self {
            config,
            clock,
            cache: RefCell::new(cache),
        }
    }

    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// Exclusive access to the preflight cache. Do not hold across callbacks.
    pub fn cache(&self) -> RefMut<'_, PreflightCache> {
        self.cache.borrow_mut()
    }

    /// Drops every cached preflight result.
    pub fn shutdown(&self) {
        let mut cache = self.cache.borrow_mut();
        debug!("dropping {} preflight cache entries", cache.len());
        cache.clear();
    }
}

/// Session for embedders without a context object of their own, configured
/// from [`CorsConfig::global`] on first use.
pub fn global_session() -> Rc<CorsSession> {
    GLOBAL_SESSION.with(|cell| {
        Rc::clone(cell.get_or_init(|| {
            Rc::new(CorsSession::from_parts(
                CorsConfig::global().clone(),
                Rc::new(SystemClock),
            ))
        }))
    })
}

/// Teardown hook for [`global_session`]; a no-op when it was never created.
pub fn shutdown_global_session() {
    GLOBAL_SESSION.with(|cell| {
        if let Some(session) = cell.get() {
            session.shutdown();
        }
    });
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
