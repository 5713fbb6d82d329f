use crate::config::Config;
use crate::core::error::FetchError;
use async_trait::async_trait;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// How far into the body we look for a `<meta charset>` hint.
const META_SNIFF_LIMIT: usize = 1024;

static META_CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-:.]+)"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub content: String,
    /// Lowercased `Content-Type` essence, e.g. `application/json`. Empty if the header was missing.
    pub media_type: String,
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        // Redirects are followed by hand so that at most one hop is taken
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(&config.user_agent, Duration::from_secs(config.timeout))
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedContent, FetchError> {
        let url = Url::parse(url)?;
        let mut response = self.client.get(url.clone()).send().await?;

        if matches!(
            response.status(),
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
        ) {
            let target = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|location| url.join(location));

            if let Some(target) = target {
                let target = target?;
                debug!("Following redirect {} -> {}", url, target);
                response = self.client.get(target).send().await?;
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let (media_type, charset) = parse_content_type(&content_type);

        let bytes = response.bytes().await?;
        debug!("Fetched {} bytes ({}) from {}", bytes.len(), media_type, url);

        Ok(FetchedContent {
            content: decode_body(&bytes, charset.as_deref()),
            media_type,
        })
    }
}

/// Splits a `Content-Type` header value into its lowercased media type and optional charset.
pub fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let media_type = parts
        .next()
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let charset = parts.find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(val.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        } else {
            None
        }
    });

    (media_type, charset)
}

/// Decodes a response body into text.
///
/// Pages in the wild come in all sorts of encodings, so the charset is picked from
/// (in order) a byte-order mark, the header charset, a `<meta>` hint near the top
/// of the document, and finally statistical detection.
pub fn decode_body(bytes: &[u8], header_charset: Option<&str>) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    let encoding = header_charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta_charset(bytes))
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head);
    let label = META_CHARSET_RE.captures(&head)?.get(1)?.as_str().to_string();
    Encoding::for_label(label.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type() {
        assert_eq!(
            parse_content_type("text/html; charset=Shift_JIS"),
            ("text/html".to_string(), Some("Shift_JIS".to_string()))
        );
        assert_eq!(
            parse_content_type("Application/JSON"),
            ("application/json".to_string(), None)
        );
        assert_eq!(parse_content_type(""), (String::new(), None));
        assert_eq!(
            parse_content_type("text/xml;charset=\"utf-8\""),
            ("text/xml".to_string(), Some("utf-8".to_string()))
        );
    }

    #[test]
    fn test_decode_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFhello";
        assert_eq!(decode_body(bytes, Some("iso-8859-1")), "hello");
    }

    #[test]
    fn test_decode_header_charset() {
        // "こんにちは" in Shift_JIS
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("こんにちは");
        assert_eq!(decode_body(&encoded, Some("shift_jis")), "こんにちは");
    }

    #[test]
    fn test_decode_meta_charset() {
        let mut bytes = b"<html><head><meta charset=\"euc-jp\"></head><body>".to_vec();
        let (encoded, _, _) = encoding_rs::EUC_JP.encode("日本語");
        bytes.extend_from_slice(&encoded);
        bytes.extend_from_slice(b"</body></html>");

        let text = decode_body(&bytes, None);
        assert!(text.contains("日本語"));
    }

    #[test]
    fn test_decode_http_equiv_charset() {
        let html = br#"<meta http-equiv="Content-Type" content="text/html; charset=windows-1252">caf"#;
        let mut bytes = html.to_vec();
        bytes.push(0xE9);
        assert!(decode_body(&bytes, None).ends_with("café"));
    }

    #[test]
    fn test_decode_plain_utf8_without_hints() {
        let text = "plain ascii and ünïcödé";
        assert_eq!(decode_body(text.as_bytes(), None), text);
    }
}
