//! Pure classification predicates for directory entries.
//!
//! The ZIM format itself does not say what an "article" is; these rules
//! are policy. They live here, away from the reader and the index, so the
//! rules can evolve without touching the format layer. Both the engine
//! and the index build pipeline go through them.

use crate::zim::{namespace, DirectoryEntry};

/// File extensions that mark an entry as a layout resource rather than an
/// article, regardless of namespace.
const RESOURCE_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot",
];

/// Whether a URL names a layout resource (stylesheet, script, image,
/// font) or lives under the `/-/` metadata tree.
pub fn is_resource_url(url: &str) -> bool {
    let url = url.to_lowercase();
    RESOURCE_EXTENSIONS.iter().any(|ext| url.ends_with(ext)) || url.contains("/-/")
}

/// Whether a directory entry is an article: in an article namespace, not
/// a redirect, and not a resource file.
pub fn is_article(entry: &DirectoryEntry) -> bool {
    (entry.namespace == namespace::ARTICLE || entry.namespace == namespace::CONTENT)
        && !entry.is_redirect()
        && !is_resource_url(&entry.url)
}

/// Whether content looks like a servable HTML page: a text-ish declared
/// content type, a non-trivial length, and markup near the top.
pub fn looks_like_html(mime_type: &str, content: &[u8]) -> bool {
    if !mime_type.is_empty() && !mime_type.contains("html") && !mime_type.contains("text") {
        return false;
    }
    if content.len() < 50 {
        return false;
    }
    let head = &content[..content.len().min(500)];
    head.contains(&b'<')
}
