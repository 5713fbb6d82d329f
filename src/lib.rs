pub mod cli;
pub mod config;
pub mod core;
pub mod providers;
pub mod trigger;
pub mod utils;

pub use config::Config;
pub use self::core::{BlockingResolver, ContentFetcher, FetchedContent, HttpFetcher, ResolutionCache, Resolver};
pub use providers::ProviderRegistry;
pub use trigger::{EmbedSource, TriggerMatcher};
