pub mod billing;
pub mod botdetect;
pub mod convert;
pub mod domain;
pub mod export;
pub mod metadata;
pub mod ports;
pub mod ratelimit;
pub mod slug;
pub mod tier;

pub use botdetect::{BotCategory, BotDetector, ClientClassification};
pub use convert::{ConversionService, ConvertError, ConvertOptions};
pub use domain::{
    Account, AccountCredentials, ContextBlock, ContextStack, ConversionRecord, RateLimitDecision,
};
pub use export::{ExportFormat, ExportOptions};
pub use ports::{
    AccountStore, ContextStackStore, ConversionStore, ExtractError, MarkdownExtractor, PortError,
    PortResult, TokenEstimator, UsageCounter,
};
pub use ratelimit::RateLimiter;
pub use tier::{Tier, TierPolicy, TierSpec};
