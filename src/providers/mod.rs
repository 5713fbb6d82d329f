pub mod oembed;
pub mod registry;

pub use oembed::{request_embed, Embed, EmbedKind, EmbedResponse};
pub use registry::{ProviderCatalogEntry, ProviderEndpoint, ProviderMatchIndex, ProviderRegistry};
