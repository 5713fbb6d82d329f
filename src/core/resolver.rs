use crate::config::Config;
use crate::core::cache::ResolutionCache;
use crate::core::error::FetchError;
use crate::core::fetcher::{ContentFetcher, HttpFetcher};
use crate::core::markup;
use crate::core::metadata::{extract_metadata, SiteMetadata};
use crate::providers::oembed::{request_embed, with_query_param};
use crate::providers::ProviderRegistry;
use crate::trigger::EmbedSource;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};
use url::Url;

pub const GIST_HOST: &str = "gist.github.com";

/// Turns a URL into the best embed markup we can find, memoizing every answer.
///
/// Strategies, first hit wins: cache, gist script, oEmbed provider catalogue,
/// oEmbed discovery from the page head, Open Graph card, plain link.
pub struct Resolver {
    fetcher: Arc<dyn ContentFetcher>,
    registry: ProviderRegistry,
    cache: Arc<ResolutionCache>,
    client_name: String,
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        registry: ProviderRegistry,
        cache: Arc<ResolutionCache>,
        client_name: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            cache,
            client_name: client_name.into(),
        }
    }

    pub fn from_config(config: &Config, cache: Arc<ResolutionCache>) -> Result<Self, FetchError> {
        let fetcher: Arc<dyn ContentFetcher> = Arc::new(HttpFetcher::from_config(config)?);
        let registry = ProviderRegistry::new(config.provider_catalog_url.clone(), fetcher.clone());
        Ok(Self::new(fetcher, registry, cache, config.client_name.clone()))
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Never fails: the worst outcome is a plain link.
    pub async fn resolve(&self, url: &str) -> String {
        self.cache
            .get_or_resolve(url, || self.resolve_uncached(url))
            .await
    }

    async fn resolve_uncached(&self, url: &str) -> String {
        if is_gist(url) {
            debug!("Embedding {} as a gist script", url);
            return markup::paragraph(&markup::gist_script(url), false);
        }

        if let Some(html) = self.from_provider(url).await {
            return html;
        }

        let metadata = match extract_metadata(self.fetcher.as_ref(), url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                info!("Falling back to a plain link for {}: {}", url, e);
                return markup::paragraph(&markup::standard_link(url), false);
            }
        };

        if let Some(html) = self.from_discovery(url, &metadata).await {
            return html;
        }

        if metadata.has_open_graph_card() {
            debug!("Building Open Graph card for {}", url);
            return markup::paragraph(&markup::open_graph_card(url, &metadata), false);
        }

        debug!("No embed found for {}, using a plain link", url);
        markup::paragraph(&markup::standard_link(url), false)
    }

    async fn from_provider(&self, url: &str) -> Option<String> {
        let index = self.registry.index().await;
        let provider_url = index.find_provider(url)?;

        let Some(endpoint) = index.endpoint_for(provider_url, url) else {
            debug!("Provider {} has no endpoint for {}", provider_url, url);
            return None;
        };

        // WordPress.com refuses oEmbed calls that do not name the calling app
        let endpoint = if provider_url.contains("wordpress.com") {
            match with_query_param(endpoint, "for", &self.client_name) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    info!("Bad endpoint {} for {}: {}", endpoint, url, e);
                    return None;
                }
            }
        } else {
            endpoint.to_string()
        };

        self.embed_markup(&endpoint, url, url).await
    }

    async fn from_discovery(&self, url: &str, metadata: &SiteMetadata) -> Option<String> {
        let href = metadata.oembed_endpoint()?;

        // Discovery links may be relative to the page
        let endpoint = match Url::parse(url).and_then(|base| base.join(href)) {
            Ok(endpoint) => endpoint.to_string(),
            Err(_) => href.to_string(),
        };

        self.embed_markup(&endpoint, "", url).await
    }

    async fn embed_markup(&self, endpoint: &str, original_url: &str, url: &str) -> Option<String> {
        match request_embed(self.fetcher.as_ref(), endpoint, original_url).await {
            Ok(embed) => {
                let html = embed.markup();
                if html.is_none() {
                    debug!("oEmbed for {} has no usable content", url);
                }
                html
            }
            Err(e) => {
                info!("oEmbed request failed for {} (endpoint {}): {}", url, endpoint, e);
                None
            }
        }
    }
}

fn is_gist(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|host| host.eq_ignore_ascii_case(GIST_HOST)))
        .unwrap_or(false)
}

/// Synchronous front for [`Resolver`], for callers that cannot await.
///
/// Must be called from outside the runtime's async context, e.g. from a
/// `spawn_blocking` worker or a plain thread.
#[derive(Clone)]
pub struct BlockingResolver {
    inner: Arc<Resolver>,
    handle: Handle,
}

impl BlockingResolver {
    pub fn new(inner: Arc<Resolver>, handle: Handle) -> Self {
        Self { inner, handle }
    }

    pub fn resolve(&self, url: &str) -> String {
        self.handle.block_on(self.inner.resolve(url))
    }
}

impl EmbedSource for BlockingResolver {
    fn embed(&self, url: &str) -> String {
        self.resolve(url)
    }
}
