pub mod cache;
pub mod channel;
pub mod clock;
pub mod config;
pub mod constants;
mod context;
mod dispatcher;
mod guard;
pub mod headers;
mod origin;
mod result;
mod session;
pub mod util;

pub use cache::{CacheEntry, CacheKey, CachedToken, PreflightCache, parse_max_age};
pub use channel::{
    Channel, ChannelRef, RedirectCallback, RedirectFlags, RedirectObserver, StreamListener,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CorsConfig, ValidationError};
pub use context::RequestContext;
pub use dispatcher::{Dispatched, PreflightDispatcher};
pub use guard::CorsGuard;
pub use headers::{HeaderList, PreflightHeaders};
pub use origin::Origin;
pub use result::{CorsError, NetError, Status};
pub use session::{CorsSession, global_session, shutdown_global_session};
