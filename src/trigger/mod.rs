//! Recognizes `[embed:"https://..."]` tokens in document text.
//!
//! A token only counts when its `[` sits at the start of the text or right after
//! whitespace. Anything else in brackets is left alone for the markup renderer.

use once_cell::sync::Lazy;
use regex::Regex;

pub const OPENING_CHAR: char = '[';

static TRIGGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\[embed:"(?P<url>https?://[^"]+)"\]"#).unwrap());

/// Anything that can turn a URL into a pre-rendered HTML fragment, blocking if it must.
pub trait EmbedSource: Send + Sync {
    fn embed(&self, url: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub url: String,
    /// Byte length of the whole token.
    pub len: usize,
}

/// Inline result handed back to the document parser: the fragment is final HTML and
/// must not be processed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment {
    pub html: String,
    pub consumed: usize,
}

/// Matches a trigger at the very start of `slice`.
///
/// `preceding` is the character before `slice`, or `None` at the start of the text.
pub fn match_trigger(slice: &str, preceding: Option<char>) -> Option<TriggerMatch> {
    if !preceding.map_or(true, char::is_whitespace) {
        return None;
    }

    let caps = TRIGGER_RE.captures(slice)?;
    Some(TriggerMatch {
        url: caps.name("url")?.as_str().to_string(),
        len: caps.get(0)?.end(),
    })
}

pub struct TriggerMatcher<S> {
    source: S,
}

impl<S: EmbedSource> TriggerMatcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Parser hook: resolve a trigger at the start of `slice`, blocking until the
    /// markup is available.
    pub fn try_match(&self, slice: &str, preceding: Option<char>) -> Option<RenderedFragment> {
        if !slice.starts_with(OPENING_CHAR) {
            return None;
        }
        let found = match_trigger(slice, preceding)?;
        Some(RenderedFragment {
            html: self.source.embed(&found.url),
            consumed: found.len,
        })
    }

    /// Replaces every trigger in `document` with its resolved markup.
    pub fn expand(&self, document: &str) -> String {
        let mut output = String::with_capacity(document.len());
        let mut preceding: Option<char> = None;
        let mut pos = 0;

        while pos < document.len() {
            let rest = &document[pos..];
            if let Some(fragment) = self.try_match(rest, preceding) {
                output.push_str(&fragment.html);
                preceding = document[..pos + fragment.consumed].chars().next_back();
                pos += fragment.consumed;
                continue;
            }

            let Some(c) = rest.chars().next() else {
                break;
            };
            output.push(c);
            preceding = Some(c);
            pos += c.len_utf8();
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        urls: Mutex<Vec<String>>,
    }

    impl EmbedSource for &Recording {
        fn embed(&self, url: &str) -> String {
            self.urls.lock().unwrap().push(url.to_string());
            format!("<p>{}</p>", url)
        }
    }

    #[test]
    fn test_match_trigger() {
        let found = match_trigger(r#"[embed:"https://example.com/a"] tail"#, None).unwrap();
        assert_eq!(found.url, "https://example.com/a");
        assert_eq!(found.len, r#"[embed:"https://example.com/a"]"#.len());

        assert!(match_trigger(r#"[embed:"http://example.com"]"#, Some(' ')).is_some());
        assert!(match_trigger(r#"[embed:"http://example.com"]"#, Some('\n')).is_some());
    }

    #[test]
    fn test_rejects_non_boundary_and_bad_scheme() {
        assert!(match_trigger(r#"[embed:"https://example.com"]"#, Some('x')).is_none());
        assert!(match_trigger(r#"[embed:"ftp://example.com"]"#, None).is_none());
        assert!(match_trigger(r#"[embed:"https://example.com"#, None).is_none());
        assert!(match_trigger(r#"[link](https://example.com)"#, None).is_none());
    }

    #[test]
    fn test_expand_document() {
        let source = Recording::default();
        let matcher = TriggerMatcher::new(&source);

        let doc = "intro\n[embed:\"https://example.com/a\"]\nsee [embed:\"https://example.com/b\"] and\nx[embed:\"https://example.com/c\"] [note]";
        let expanded = matcher.expand(doc);

        assert_eq!(
            expanded,
            "intro\n<p>https://example.com/a</p>\nsee <p>https://example.com/b</p> and\nx[embed:\"https://example.com/c\"] [note]"
        );
        assert_eq!(
            *source.urls.lock().unwrap(),
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn test_expand_keeps_multibyte_text() {
        let source = Recording::default();
        let matcher = TriggerMatcher::new(&source);

        let doc = "日本語 [embed:\"https://example.com/日本\"] ü";
        assert_eq!(
            matcher.expand(doc),
            "日本語 <p>https://example.com/日本</p> ü"
        );
    }

    #[test]
    fn test_try_match_reports_consumed_bytes() {
        let source = Recording::default();
        let matcher = TriggerMatcher::new(&source);

        let fragment = matcher
            .try_match(r#"[embed:"https://example.com"] rest"#, None)
            .unwrap();
        assert_eq!(fragment.html, "<p>https://example.com</p>");
        assert_eq!(fragment.consumed, r#"[embed:"https://example.com"]"#.len());
        assert!(matcher.try_match("plain", None).is_none());
    }
}
