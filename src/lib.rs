//! Reader, search index, and content engine for ZIM archives.
//!
//! A ZIM file is a single read-only archive holding a full offline snapshot
//! of a wiki: articles, images, stylesheets, and the structural tables to
//! address them. This crate answers three questions against such a file:
//!
//! - *Where is entry X?* [`ZimReader`] parses the directory and finds
//!   entries by index or by `(namespace, url)`.
//! - *Give me its bytes.* [`ZimReader`] decodes the compressed cluster
//!   holding the entry's blob, with a bounded LRU cache of decompressed
//!   clusters.
//! - *Which articles match a query?* [`TitleIndex`] is a persistent
//!   tantivy index over article titles, built once with [`build_index`]
//!   and opened read-only at serve time.
//!
//! [`Wikipedia`] layers article-level policy on top of the two: redirect
//! resolution (archive-internal and HTML meta-refresh), image lookup,
//! random article selection, and article classification.

pub mod engine;
pub mod search;
pub mod zim;

pub use engine::{Article, Wikipedia};
pub use search::{build_index, default_index_path, SearchResult, TitleIndex};
pub use zim::{namespace, DirectoryEntry, EntryKind, Result, ZimError, ZimHeader, ZimReader};
