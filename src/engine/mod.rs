//! Article-level policy over the raw archive and the title index.
//!
//! The reader exposes what the ZIM format stores; this module owns the
//! decisions the format does not make: which entries count as articles,
//! how HTML meta-refresh pages are followed, which namespaces to probe
//! for a URL or an image, and what a "random article" means.

pub mod classify;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use percent_encoding::percent_decode_str;
use rand::Rng;
use regex::Regex;

use crate::search::{SearchResult, TitleIndex};
use crate::zim::{namespace, Result, ZimError, ZimReader};

/// Maximum HTML meta-refresh hops followed on top of archive redirects.
const MAX_HTML_REDIRECT_DEPTH: u32 = 5;

/// Sampling budget for index-less random article selection.
const MAX_RANDOM_ATTEMPTS: u32 = 500;

/// An article resolved through redirects, ready to hand to a renderer.
#[derive(Debug, Clone)]
pub struct Article {
    /// Directory index the content was finally served from.
    pub index: u32,
    pub url: String,
    pub title: String,
    /// Raw content bytes as stored in the archive.
    pub content: Vec<u8>,
    /// Content-type string declared by the archive; empty if undeclared.
    pub mime_type: String,
}

/// Serves wiki content from a ZIM archive, optionally backed by a
/// persistent title index for search and random selection.
pub struct Wikipedia {
    reader: Arc<ZimReader>,
    index: Option<TitleIndex>,
}

impl Wikipedia {
    /// Creates an engine without a search index; [`Self::search`] will
    /// fail until one is attached.
    pub fn new(reader: Arc<ZimReader>) -> Self {
        Self {
            reader,
            index: None,
        }
    }

    /// Creates an engine and tries to open the title index at
    /// `index_path`. A missing or unreadable index is logged and search
    /// is left disabled; everything else keeps working.
    pub fn with_index(reader: Arc<ZimReader>, index_path: impl AsRef<Path>) -> Self {
        let index_path = index_path.as_ref();
        let index = match TitleIndex::open(index_path) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(
                    "Search index not available at {}: {e}; search disabled",
                    index_path.display()
                );
                None
            }
        };
        Self { reader, index }
    }

    /// The underlying archive reader, for collaborators that resolve
    /// links or images during content transformation.
    pub fn reader(&self) -> &ZimReader {
        &self.reader
    }

    /// Whether a title index is loaded.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Searches article titles.
    ///
    /// # Errors
    /// [`ZimError::IndexUnavailable`] when no title index is loaded.
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        match &self.index {
            Some(index) => index.search(query, max_results),
            None => Err(ZimError::IndexUnavailable),
        }
    }

    /// Retrieves an article by directory index, following archive
    /// redirects and up to [`MAX_HTML_REDIRECT_DEPTH`] HTML meta-refresh
    /// hops. When a refresh target cannot be resolved, the refresh page
    /// itself is returned so the caller can present a redirect notice.
    pub fn get_article(&self, index: u32) -> Result<Article> {
        self.get_article_at_depth(index, 0)
    }

    /// Retrieves an article by URL, probing namespace `A` then `C`.
    pub fn get_by_url(&self, url: &str) -> Result<Article> {
        self.get_by_url_at_depth(url, 0)
    }

    /// Retrieves an image (or other media) by path, probing namespaces
    /// `I`, `-`, and `C`, with the percent-decoded path tried first.
    /// Returns the raw bytes and the declared content type.
    pub fn get_image(&self, path: &str) -> Result<(Vec<u8>, String)> {
        let index = self.find_image_id(path)?;
        self.reader.read_content(index)
    }

    /// Resolves an image path to its directory index, using the same
    /// probe order as [`Self::get_image`].
    pub fn find_image_id(&self, path: &str) -> Result<u32> {
        // ZIM stores decoded URLs, so a percent-encoded path from a page
        // link usually needs decoding before it matches.
        let decoded = percent_decode_str(path).decode_utf8_lossy().into_owned();
        let mut candidates = Vec::with_capacity(2);
        if !decoded.is_empty() && decoded != path {
            candidates.push(decoded.as_str());
        }
        candidates.push(path);

        for candidate in candidates {
            for ns in [namespace::IMAGE, namespace::RESOURCE, namespace::CONTENT] {
                if let Ok(index) = self.reader.find_entry(ns, candidate) {
                    return Ok(index);
                }
            }
        }
        Err(ZimError::NotFound {
            namespace: namespace::IMAGE as char,
            url: path.to_string(),
        })
    }

    /// Picks a random article that will actually render.
    ///
    /// Prefers the title index (already restricted to articles); without
    /// one, samples directory indices uniformly and rejects entries that
    /// are not articles or whose content does not look like HTML.
    ///
    /// # Errors
    /// [`ZimError::NoArticleFound`] when the sampling budget is exhausted.
    pub fn random_article(&self) -> Result<Article> {
        if let Some(index) = &self.index {
            let idx = index.random_article_index()?;
            return self.get_article(idx);
        }

        let count = self.reader.entry_count();
        if count == 0 {
            return Err(ZimError::NoArticleFound(0));
        }

        let mut rng = rand::thread_rng();
        for _ in 0..MAX_RANDOM_ATTEMPTS {
            let idx = rng.gen_range(0..count);
            let Ok(entry) = self.reader.lookup_entry(idx) else {
                continue;
            };
            if !classify::is_article(&entry) {
                continue;
            }
            let Ok((content, mime_type)) = self.reader.read_content(idx) else {
                continue;
            };
            if !classify::looks_like_html(&mime_type, &content) {
                continue;
            }
            return self.get_article(idx);
        }
        Err(ZimError::NoArticleFound(MAX_RANDOM_ATTEMPTS))
    }

    /// Whether the article's raw HTML carries an infobox. Cheap substring
    /// probe, no parsing; read errors count as "no".
    pub fn has_infobox(&self, index: u32) -> bool {
        match self.reader.read_content(index) {
            Ok((content, _)) => {
                String::from_utf8_lossy(&content).contains(r#"class="infobox"#)
            }
            Err(_) => false,
        }
    }

    /// Number of articles: the indexed document count when a title index
    /// is loaded, otherwise an estimate of half the directory (typical
    /// archives are roughly half redirects and resources).
    pub fn article_count(&self) -> u32 {
        if let Some(index) = &self.index {
            if let Ok(count) = index.document_count() {
                return count as u32;
            }
        }
        self.reader.entry_count() / 2
    }

    /// The archive's designated main page.
    pub fn main_page(&self) -> Result<Article> {
        self.get_article(self.reader.main_page_index())
    }

    fn get_article_at_depth(&self, index: u32, depth: u32) -> Result<Article> {
        if depth > MAX_HTML_REDIRECT_DEPTH {
            return Err(ZimError::RedirectLoop(MAX_HTML_REDIRECT_DEPTH));
        }

        let entry = self.reader.lookup_entry(index)?;
        let (content, mime_type) = self.reader.read_content(index)?;

        if let Some(target) = meta_refresh_target(&content) {
            debug!("entry {index} is a meta-refresh page, following to {target:?}");
            if let Ok(article) = self.get_by_url_at_depth(&target, depth + 1) {
                return Ok(article);
            }
            // Unresolvable target: fall through to the refresh page itself.
        }

        Ok(Article {
            index,
            url: entry.url,
            title: entry.title,
            content,
            mime_type,
        })
    }

    fn get_by_url_at_depth(&self, url: &str, depth: u32) -> Result<Article> {
        let index = self
            .reader
            .find_entry(namespace::ARTICLE, url)
            .or_else(|_| self.reader.find_entry(namespace::CONTENT, url))?;
        self.get_article_at_depth(index, depth)
    }
}

/// Extracts the target of an HTML meta-refresh page
/// (`<meta http-equiv="refresh" content="0;URL='...'">`), stripped of a
/// leading `./` and any `#fragment`.
fn meta_refresh_target(content: &[u8]) -> Option<String> {
    let html = String::from_utf8_lossy(content);
    if !html.contains(r#"http-equiv="refresh""#) {
        return None;
    }

    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r#"content="[^"]*URL='([^']*)'"#).expect("literal pattern"));

    let target = re.captures(&html)?.get(1)?.as_str();
    let target = target.strip_prefix("./").unwrap_or(target);
    let target = match target.find('#') {
        Some(at) => &target[..at],
        None => target,
    };
    if target.is_empty() {
        return None;
    }
    Some(target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_refresh_extraction() {
        let page = br#"<html><head><meta http-equiv="refresh" content="0;URL='./Apple#History'"></head></html>"#;
        assert_eq!(meta_refresh_target(page).as_deref(), Some("Apple"));

        let plain = b"<html><body>not a redirect</body></html>";
        assert_eq!(meta_refresh_target(plain), None);

        let no_url = br#"<meta http-equiv="refresh" content="5">"#;
        assert_eq!(meta_refresh_target(no_url), None);
    }
}
