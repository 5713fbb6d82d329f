//! oEmbed endpoint requests and response decoding.
//!
//! Endpoints answer with either JSON or XML; both are decoded into the same
//! [`EmbedResponse`] shape and validated in one place by [`EmbedResponse::into_embed`].

use crate::core::error::{EmbedDecodeError, EmbedError, FetchError};
use crate::core::fetcher::ContentFetcher;
use crate::core::markup;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedKind {
    Video,
    Photo,
    Link,
    Rich,
    Other(String),
}

impl Default for EmbedKind {
    fn default() -> Self {
        EmbedKind::Other(String::new())
    }
}

impl EmbedKind {
    pub fn as_str(&self) -> &str {
        match self {
            EmbedKind::Video => "video",
            EmbedKind::Photo => "photo",
            EmbedKind::Link => "link",
            EmbedKind::Rich => "rich",
            EmbedKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for EmbedKind {
    fn from(value: &str) -> Self {
        match value {
            "video" => EmbedKind::Video,
            "photo" => EmbedKind::Photo,
            "link" => EmbedKind::Link,
            "rich" => EmbedKind::Rich,
            other => EmbedKind::Other(other.to_string()),
        }
    }
}

/// Decoded oEmbed payload. Numeric fields are kept as the strings they were sent as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedResponse {
    pub kind: EmbedKind,
    pub html: String,
    pub url: String,
    pub width: String,
    pub height: String,
}

/// A validated embed, ready to be turned into markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    Html { html: String, video: bool },
    Photo { url: String, width: String, height: String },
    /// A `link` response carries nothing we can render.
    Link,
}

impl Embed {
    /// Paragraph-wrapped markup, or `None` when the embed has no usable content.
    pub fn markup(&self) -> Option<String> {
        match self {
            Embed::Html { html, video } => Some(markup::paragraph(html, *video)),
            Embed::Photo { url, width, height } => {
                Some(markup::paragraph(&markup::photo(url, width, height), false))
            }
            Embed::Link => None,
        }
    }
}

impl EmbedResponse {
    fn from_fields(mut fields: HashMap<String, String>) -> Self {
        let mut take = |name: &str| fields.remove(name).unwrap_or_default();
        Self {
            kind: EmbedKind::from(take("type").as_str()),
            html: take("html"),
            url: take("url"),
            width: take("width"),
            height: take("height"),
        }
    }

    pub fn from_json(content: &str) -> Result<Self, EmbedDecodeError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| EmbedDecodeError::Malformed(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(EmbedDecodeError::Malformed(
                "expected a JSON object".to_string(),
            ));
        };

        // Some providers send width/height as strings, others as numbers
        let fields = object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                Value::Number(n) => Some((key, n.to_string())),
                _ => None,
            })
            .collect();

        Ok(Self::from_fields(fields))
    }

    pub fn from_xml(content: &str) -> Result<Self, EmbedDecodeError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut fields: HashMap<String, String> = HashMap::new();
        let mut current: Option<String> = None;
        let mut depth = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    depth += 1;
                    if depth == 2 {
                        current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    }
                }
                Ok(Event::End(_)) => {
                    if depth == 2 {
                        current = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Text(e)) => {
                    if let Some(name) = &current {
                        let text = e
                            .unescape()
                            .map_err(|e| EmbedDecodeError::Malformed(e.to_string()))?;
                        fields.entry(name.clone()).or_default().push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(name) = &current {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        fields.entry(name.clone()).or_default().push_str(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(EmbedDecodeError::Malformed(format!(
                        "XML error at position {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        Ok(Self::from_fields(fields))
    }

    /// Picks a decoder from the response media type.
    pub fn decode(content: &str, media_type: &str) -> Result<Self, EmbedDecodeError> {
        match media_type {
            "application/json" | "text/plain" | "text/html" => Self::from_json(content),
            "application/xml" | "text/xml" => Self::from_xml(content),
            other => Err(EmbedDecodeError::UnsupportedMediaType(other.to_string())),
        }
    }

    /// Checks the fields each response type requires.
    pub fn into_embed(self) -> Result<Embed, EmbedDecodeError> {
        if !self.html.is_empty() {
            return Ok(Embed::Html {
                video: self.kind == EmbedKind::Video,
                html: self.html,
            });
        }

        match self.kind {
            EmbedKind::Photo => {
                let required = [
                    ("url", &self.url),
                    ("width", &self.width),
                    ("height", &self.height),
                ];
                if let Some((name, _)) = required.into_iter().find(|(_, value)| value.is_empty()) {
                    return Err(EmbedDecodeError::MissingRequiredField(name));
                }
                Ok(Embed::Photo {
                    url: self.url,
                    width: self.width,
                    height: self.height,
                })
            }
            EmbedKind::Link => Ok(Embed::Link),
            kind => Err(EmbedDecodeError::UnsupportedContentType(
                kind.as_str().to_string(),
            )),
        }
    }
}

/// Appends `key=value` to the query string of `url`, keeping any existing parameters.
pub fn with_query_param(url: &str, key: &str, value: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(url)?;
    url.query_pairs_mut().append_pair(key, value);
    Ok(url.into())
}

/// Calls an oEmbed endpoint for `original_url` (omitted from the query when empty).
pub async fn request_embed(
    fetcher: &dyn ContentFetcher,
    endpoint: &str,
    original_url: &str,
) -> Result<Embed, EmbedError> {
    let request_url = if original_url.is_empty() {
        endpoint.to_string()
    } else {
        with_query_param(endpoint, "url", original_url).map_err(FetchError::from)?
    };

    debug!("Requesting oEmbed {}", request_url);
    let fetched = fetcher.fetch(&request_url).await?;
    let response = EmbedResponse::decode(&fetched.content, &fetched.media_type)?;
    Ok(response.into_embed()?)
}
