use crate::core::fetcher::ContentFetcher;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_CATALOG_URL: &str = "https://oembed.com/providers.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCatalogEntry {
    pub provider_name: Option<String>,
    pub provider_url: String,
    #[serde(default)]
    pub endpoints: Vec<ProviderEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub url: String,
    #[serde(default)]
    pub schemes: Vec<String>,
}

/// Turns a catalogue scheme such as `https://*.example.com/video/*` into a regex.
fn scheme_pattern(scheme: &str) -> Option<Regex> {
    match Regex::new(&scheme.replace('*', ".*")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Skipping invalid provider scheme {:?}: {}", scheme, e);
            None
        }
    }
}

/// An endpoint with its schemes compiled.
#[derive(Debug)]
struct CompiledEndpoint {
    url: String,
    schemes: Vec<Regex>,
}

#[derive(Debug)]
struct CompiledProvider {
    provider_url: String,
    endpoints: Vec<CompiledEndpoint>,
    /// `provider_url*`, so that a bare provider URL prefix also matches.
    prefix: Option<Regex>,
}

impl CompiledProvider {
    fn matches(&self, url: &str) -> bool {
        self.endpoints
            .iter()
            .flat_map(|endpoint| endpoint.schemes.iter())
            .chain(self.prefix.iter())
            .any(|re| re.is_match(url))
    }
}

/// Compiled match rules for every catalogue entry, in catalogue order.
///
/// Schemes are compiled once, at build time.
#[derive(Debug, Default)]
pub struct ProviderMatchIndex {
    providers: Vec<CompiledProvider>,
}

impl ProviderMatchIndex {
    pub fn build(entries: Vec<ProviderCatalogEntry>) -> Self {
        let providers = entries
            .into_iter()
            .map(|entry| CompiledProvider {
                prefix: scheme_pattern(&format!("{}*", entry.provider_url)),
                endpoints: entry
                    .endpoints
                    .into_iter()
                    .map(|endpoint| CompiledEndpoint {
                        schemes: endpoint.schemes.iter().filter_map(|s| scheme_pattern(s)).collect(),
                        url: endpoint.url,
                    })
                    .collect(),
                provider_url: entry.provider_url,
            })
            .collect();

        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// First provider (in catalogue order) with a pattern matching `url`.
    pub fn find_provider(&self, url: &str) -> Option<&str> {
        self.providers
            .iter()
            .find(|provider| provider.matches(url))
            .map(|provider| provider.provider_url.as_str())
    }

    /// Endpoint URL of `provider_url` whose schemes match `url`.
    pub fn endpoint_for(&self, provider_url: &str, url: &str) -> Option<&str> {
        self.providers
            .iter()
            .filter(|provider| provider.provider_url == provider_url)
            .flat_map(|provider| provider.endpoints.iter())
            .find(|endpoint| endpoint.schemes.iter().any(|re| re.is_match(url)))
            .map(|endpoint| endpoint.url.as_str())
    }

    #[cfg(test)]
    fn compiled_schemes(&self) -> usize {
        self.providers
            .iter()
            .flat_map(|provider| provider.endpoints.iter())
            .map(|endpoint| endpoint.schemes.len())
            .sum()
    }
}

/// Lazily loaded provider catalogue.
///
/// The catalogue is fetched on first use, once, no matter how many resolutions ask for
/// it concurrently. A failed load leaves the index empty for the rest of the run.
pub struct ProviderRegistry {
    catalog_url: String,
    fetcher: Arc<dyn ContentFetcher>,
    index: OnceCell<ProviderMatchIndex>,
}

impl ProviderRegistry {
    pub fn new(catalog_url: impl Into<String>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            fetcher,
            index: OnceCell::new(),
        }
    }

    /// A registry that never touches the network.
    pub fn from_index(index: ProviderMatchIndex, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            catalog_url: String::new(),
            fetcher,
            index: OnceCell::new_with(Some(index)),
        }
    }

    pub async fn index(&self) -> &ProviderMatchIndex {
        self.index.get_or_init(|| self.load()).await
    }

    async fn load(&self) -> ProviderMatchIndex {
        debug!("Loading oEmbed provider catalogue from {}", self.catalog_url);

        let fetched = match self.fetcher.fetch(&self.catalog_url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("oEmbed provider catalogue could not be fetched: {}", e);
                return ProviderMatchIndex::default();
            }
        };

        match serde_json::from_str::<Vec<ProviderCatalogEntry>>(&fetched.content) {
            Ok(entries) => {
                let index = ProviderMatchIndex::build(entries);
                info!("Loaded {} oEmbed providers", index.len());
                index
            }
            Err(e) => {
                warn!("oEmbed provider catalogue is malformed: {}", e);
                ProviderMatchIndex::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> Vec<ProviderCatalogEntry> {
        serde_json::from_str(
            r#"[
                {
                    "provider_name": "YouTube",
                    "provider_url": "https://www.youtube.com/",
                    "endpoints": [
                        {
                            "schemes": ["https://*.youtube.com/watch*", "https://youtu.be/*"],
                            "url": "https://www.youtube.com/oembed",
                            "discovery": true
                        }
                    ]
                },
                {
                    "provider_name": "Multi",
                    "provider_url": "https://multi.example",
                    "endpoints": [
                        { "schemes": ["https://multi.example/photo/*"], "url": "https://multi.example/oembed/photo" },
                        { "schemes": ["https://multi.example/video/*"], "url": "https://multi.example/oembed/video" }
                    ]
                },
                {
                    "provider_name": "No schemes",
                    "provider_url": "https://bare.example",
                    "endpoints": [ { "url": "https://bare.example/oembed" } ]
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_find_provider_by_scheme() {
        let index = ProviderMatchIndex::build(catalogue());

        assert_eq!(
            index.find_provider("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("https://www.youtube.com/")
        );
        assert_eq!(
            index.find_provider("https://youtu.be/dQw4w9WgXcQ"),
            Some("https://www.youtube.com/")
        );
        assert_eq!(index.find_provider("https://example.com/a"), None);
    }

    #[test]
    fn test_bare_provider_url_matches_as_prefix() {
        let index = ProviderMatchIndex::build(catalogue());

        assert_eq!(
            index.find_provider("https://bare.example/anything"),
            Some("https://bare.example")
        );
        // no endpoint scheme matches, so there is nothing to call
        assert_eq!(
            index.endpoint_for("https://bare.example", "https://bare.example/anything"),
            None
        );
    }

    #[test]
    fn test_endpoint_selected_by_matching_scheme() {
        let index = ProviderMatchIndex::build(catalogue());

        assert_eq!(
            index.endpoint_for("https://multi.example", "https://multi.example/video/1"),
            Some("https://multi.example/oembed/video")
        );
        assert_eq!(
            index.endpoint_for("https://multi.example", "https://multi.example/photo/1"),
            Some("https://multi.example/oembed/photo")
        );
    }

    #[test]
    fn test_first_provider_wins() {
        let mut entries = catalogue();
        entries.insert(
            0,
            ProviderCatalogEntry {
                provider_name: None,
                provider_url: "https://first.example".to_string(),
                endpoints: vec![ProviderEndpoint {
                    url: "https://first.example/oembed".to_string(),
                    schemes: vec!["https://youtu.be/*".to_string()],
                }],
            },
        );
        let index = ProviderMatchIndex::build(entries);

        assert_eq!(
            index.find_provider("https://youtu.be/abc"),
            Some("https://first.example")
        );
    }

    #[test]
    fn test_invalid_scheme_is_skipped() {
        let index = ProviderMatchIndex::build(vec![ProviderCatalogEntry {
            provider_name: None,
            provider_url: "https://broken.example".to_string(),
            endpoints: vec![ProviderEndpoint {
                url: "https://broken.example/oembed".to_string(),
                schemes: vec!["https://broken.example/(*".to_string()],
            }],
        }]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.find_provider("https://other.example"), None);
        assert_eq!(
            index.find_provider("https://broken.example/x"),
            Some("https://broken.example")
        );
    }

    #[test]
    fn test_invalid_scheme_dropped_at_build_time() {
        let index = ProviderMatchIndex::build(vec![ProviderCatalogEntry {
            provider_name: None,
            provider_url: "https://mixed.example".to_string(),
            endpoints: vec![ProviderEndpoint {
                url: "https://mixed.example/oembed".to_string(),
                schemes: vec![
                    "https://mixed.example/(*".to_string(),
                    "https://mixed.example/post/*".to_string(),
                ],
            }],
        }]);

        assert_eq!(index.compiled_schemes(), 1);
        for _ in 0..3 {
            assert_eq!(
                index.endpoint_for("https://mixed.example", "https://mixed.example/post/1"),
                Some("https://mixed.example/oembed")
            );
            assert_eq!(
                index.endpoint_for("https://mixed.example", "https://mixed.example/(x"),
                None
            );
        }
    }
}
