pub mod cache;
pub mod error;
pub mod fetcher;
pub mod markup;
pub mod metadata;
pub mod resolver;

pub use cache::ResolutionCache;
pub use error::{CacheError, EmbedDecodeError, EmbedError, ExtractError, FetchError};
pub use fetcher::{ContentFetcher, FetchedContent, HttpFetcher};
pub use metadata::SiteMetadata;
pub use resolver::{BlockingResolver, Resolver};
