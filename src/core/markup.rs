//! HTML fragments produced by the resolver.

use crate::core::metadata::SiteMetadata;
use crate::utils::{escape_html, strip_scheme};

pub const VIDEO_CLASS: &str = "oembed-video";

/// Wraps a fragment in the paragraph container the templates expect.
pub fn paragraph(inner: &str, video: bool) -> String {
    if video {
        format!("<p class='{}'>{}</p>", VIDEO_CLASS, inner)
    } else {
        format!("<p>{}</p>", inner)
    }
}

pub fn standard_link(url: &str) -> String {
    let url = escape_html(url);
    format!("<a href=\"{}\" target=\"_blank\">{}</a>", url, url)
}

pub fn gist_script(url: &str) -> String {
    format!("<script src=\"{}.js\"></script>", escape_html(url))
}

pub fn photo(url: &str, width: &str, height: &str) -> String {
    format!(
        "<img src=\"{}\" width=\"{}\" height=\"{}\" />",
        escape_html(url),
        escape_html(width),
        escape_html(height)
    )
}

/// Link card built from Open Graph tags, with favicon and a Hatena bookmark badge.
///
/// Every page-supplied value is escaped, attribute slots included.
pub fn open_graph_card(url: &str, meta: &SiteMetadata) -> String {
    let href = escape_html(url);
    let link = |inner: &str| {
        format!(
            "<a href=\"{}\" rel=\"nofollow\" target=\"_blank\">{}</a>",
            href, inner
        )
    };

    let mut html = String::new();
    html.push_str("<div class=\"bcard-wrapper\">");

    html.push_str("<span class=\"bcard-header withgfav\">");
    html.push_str(&format!(
        "<div class=\"bcard-favicon\" style=\"background-image: url(https://www.google.com/s2/favicons?domain={})\"></div>",
        href
    ));
    html.push_str(&format!(
        "<div class=\"bcard-site\">{}</div>",
        link(&escape_html(&meta.og_site_name))
    ));
    html.push_str(&format!("<div class=\"bcard-url\">{}</div>", link(&href)));
    html.push_str("</span>");

    html.push_str("<span class=\"bcard-main withogimg\">");
    html.push_str(&format!(
        "<div class=\"bcard-title\">{}</div>",
        link(&escape_html(&meta.og_title))
    ));
    html.push_str(&format!(
        "<div class=\"bcard-description\">{}</div>",
        escape_html(&meta.og_description)
    ));
    html.push_str(&link(&format!(
        "<div class=\"bcard-img\" style=\"background-image: url({})\"></div>",
        escape_html(&meta.og_image)
    )));
    html.push_str("</span>");

    html.push_str(&format!(
        "<span><a href=\"//b.hatena.ne.jp/entry/s/{}\" rel=\"nofollow\" target=\"_blank\"><img src=\"//b.st-hatena.com/entry/image/{}\" alt=\"[Hatena Bookmark]\"></a></span>",
        escape_html(strip_scheme(url)),
        href
    ));

    html.push_str("</div>");
    html
}
