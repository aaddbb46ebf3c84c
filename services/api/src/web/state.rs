//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use crate::config::Config;
use ctxt_core::botdetect::BotDetector;
use ctxt_core::convert::ConversionService;
use ctxt_core::ports::{AccountStore, ContextStackStore, ConversionStore};
use ctxt_core::ratelimit::RateLimiter;
use ctxt_core::tier::TierPolicy;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Services are constructed explicitly and injected here; there are no
/// process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tier_policy: TierPolicy,
    pub accounts: Arc<dyn AccountStore>,
    pub conversions: Arc<dyn ConversionStore>,
    pub stacks: Arc<dyn ContextStackStore>,
    pub converter: Arc<ConversionService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub bot_detector: Arc<BotDetector>,
}
