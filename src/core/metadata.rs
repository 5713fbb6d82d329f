use crate::core::error::ExtractError;
use crate::core::fetcher::ContentFetcher;
use scraper::{Html, Selector};
use tracing::debug;

/// What we could learn about a page from its HTML head.
///
/// Every field is a plain string; an empty string means the tag was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteMetadata {
    pub url: String,
    pub title: String,
    pub og_title: String,
    pub og_image: String,
    pub og_description: String,
    pub og_type: String,
    pub og_url: String,
    pub og_site_name: String,
    pub oembed_json: String,
    pub oembed_xml: String,
}

impl SiteMetadata {
    /// The advertised oEmbed endpoint, JSON preferred over XML.
    pub fn oembed_endpoint(&self) -> Option<&str> {
        [&self.oembed_json, &self.oembed_xml]
            .into_iter()
            .find(|link| !link.is_empty())
            .map(String::as_str)
    }

    pub fn has_open_graph_card(&self) -> bool {
        !self.og_title.is_empty() && !self.og_url.is_empty()
    }
}

pub async fn extract_metadata(
    fetcher: &dyn ContentFetcher,
    url: &str,
) -> Result<SiteMetadata, ExtractError> {
    let fetched = fetcher.fetch(url).await?;
    if fetched.content.trim().is_empty() {
        return Err(ExtractError::ParseFailed("empty document".to_string()));
    }

    let metadata = parse_metadata(url, &fetched.content)?;
    debug!(
        "Metadata for {}: og:title={:?} og:url={:?} oembed json={:?} xml={:?}",
        url, metadata.og_title, metadata.og_url, metadata.oembed_json, metadata.oembed_xml
    );
    Ok(metadata)
}

pub fn parse_metadata(url: &str, html: &str) -> Result<SiteMetadata, ExtractError> {
    let document = Html::parse_document(html);

    let xml_link = select_attr(&document, "link[type='application/xml+oembed']", "href")?;
    let oembed_xml = if xml_link.is_empty() {
        select_attr(&document, "link[type='text/xml+oembed']", "href")?
    } else {
        xml_link
    };

    Ok(SiteMetadata {
        url: url.to_string(),
        title: select_text(&document, "title")?,
        og_title: og_property(&document, "og:title")?,
        og_image: og_property(&document, "og:image")?,
        og_description: og_property(&document, "og:description")?,
        og_type: og_property(&document, "og:type")?,
        og_url: og_property(&document, "og:url")?,
        og_site_name: og_property(&document, "og:site_name")?,
        oembed_json: select_attr(&document, "link[type='application/json+oembed']", "href")?,
        oembed_xml,
    })
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::ParseFailed(format!("{}: {:?}", css, e)))
}

fn og_property(document: &Html, property: &str) -> Result<String, ExtractError> {
    select_attr(
        document,
        &format!("meta[property='{}']", property),
        "content",
    )
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Result<String, ExtractError> {
    let selector = selector(css)?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .unwrap_or_default()
        .to_string())
}

fn select_text(document: &Html, css: &str) -> Result<String, ExtractError> {
    let selector = selector(css)?;
    Ok(document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default())
}
