//! Persistent full-text search over article titles.
//!
//! The index is a tantivy directory built once per archive with
//! [`build_index`] and opened read-only at serve time. Each indexed
//! article becomes one document:
//! - `id`: entry index as decimal text, the primary key
//! - `title`: tokenized with positions, stored
//! - `title_exact`: lower-cased raw keyword for exact/prefix/fuzzy/wildcard
//! - `url`: stored only
//! - `idx`: numeric entry index, stored for retrieval

mod build;

pub use build::build_index;

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::debug;
use rand::Rng;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

use crate::zim::{Result, ZimError};

/// Boosts for the five query clauses, highest priority first.
const BOOST_EXACT: f32 = 100.0;
const BOOST_PREFIX: f32 = 50.0;
const BOOST_ANALYZED: f32 = 10.0;
const BOOST_FUZZY: f32 = 5.0;
const BOOST_WILDCARD: f32 = 3.0;

/// Queries at or below this length skip the fuzzy clause; its cost
/// dominates its utility on short strings.
const FUZZY_MIN_QUERY_LEN: usize = 3;

/// The conventional index location: the archive path with its extension
/// swapped to `.bluge`.
pub fn default_index_path(zim_path: impl AsRef<Path>) -> PathBuf {
    zim_path.as_ref().with_extension("bluge")
}

/// One scored title match.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Directory index of the matched entry.
    pub index: u32,
    pub url: String,
    pub title: String,
    pub score: f32,
}

#[derive(Debug)]
pub(crate) struct TitleFields {
    id: Field,
    title: Field,
    title_exact: Field,
    url: Field,
    idx: Field,
}

impl TitleFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            id: schema.get_field("id")?,
            title: schema.get_field("title")?,
            title_exact: schema.get_field("title_exact")?,
            url: schema.get_field("url")?,
            idx: schema.get_field("idx")?,
        })
    }
}

pub(crate) fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("title", TEXT | STORED);
    builder.add_text_field("title_exact", STRING | STORED);
    builder.add_text_field("url", STORED);
    builder.add_u64_field("idx", STORED);
    builder.build()
}

/// Read-only handle on a built title index.
///
/// Shared-immutable after open; the document count is computed once on
/// demand and cached. The index is released when the handle is dropped.
pub struct TitleIndex {
    index: Index,
    reader: IndexReader,
    fields: TitleFields,
    doc_count: RwLock<Option<u64>>,
}

impl std::fmt::Debug for TitleIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleIndex").finish_non_exhaustive()
    }
}

impl TitleIndex {
    /// Opens an existing index directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let index = Index::open_in_dir(path.as_ref())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let fields = TitleFields::resolve(&index.schema())?;
        Ok(Self {
            index,
            reader,
            fields,
            doc_count: RwLock::new(None),
        })
    }

    /// Runs a scored title query and returns the top matches.
    ///
    /// The query is matched as a disjunction of boosted clauses: exact
    /// term (100), prefix (50), analyzed tokens (10), fuzzy at edit
    /// distance 1 for queries longer than three characters (5), and
    /// substring wildcard (3). An empty query returns no results.
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }

        debug!("title search: query={query:?}, max_results={max_results}");
        let folded = query.to_lowercase();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(5);

        let exact = TermQuery::new(
            Term::from_field_text(self.fields.title_exact, &folded),
            IndexRecordOption::Basic,
        );
        clauses.push((Occur::Should, boosted(Box::new(exact), BOOST_EXACT)));

        let prefix = RegexQuery::from_pattern(
            &format!("{}.*", regex::escape(&folded)),
            self.fields.title_exact,
        )?;
        clauses.push((Occur::Should, boosted(Box::new(prefix), BOOST_PREFIX)));

        let tokens = self.analyze(query)?;
        if !tokens.is_empty() {
            let token_clauses = tokens
                .iter()
                .map(|token| {
                    let term = Term::from_field_text(self.fields.title, token);
                    let query: Box<dyn Query> =
                        Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                    (Occur::Should, query)
                })
                .collect::<Vec<_>>();
            clauses.push((
                Occur::Should,
                boosted(Box::new(BooleanQuery::new(token_clauses)), BOOST_ANALYZED),
            ));
        }

        if query.chars().count() > FUZZY_MIN_QUERY_LEN {
            let fuzzy = FuzzyTermQuery::new(
                Term::from_field_text(self.fields.title_exact, &folded),
                1,
                true,
            );
            clauses.push((Occur::Should, boosted(Box::new(fuzzy), BOOST_FUZZY)));
        }

        let wildcard = RegexQuery::from_pattern(
            &format!(".*{}.*", regex::escape(&folded)),
            self.fields.title_exact,
        )?;
        clauses.push((Occur::Should, boosted(Box::new(wildcard), BOOST_WILDCARD)));

        let searcher = self.reader.searcher();
        let top = searcher.search(&BooleanQuery::new(clauses), &TopDocs::with_limit(max_results))?;

        let mut results = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            results.push(self.result_from_doc(&doc, score)?);
        }
        debug!("title search: {} results for {query:?}", results.len());
        Ok(results)
    }

    /// Number of indexed documents. Computed with a match-all count on
    /// first use and cached; later calls are O(1).
    pub fn document_count(&self) -> Result<u64> {
        if let Some(count) = *self.doc_count.read().map_err(|_| ZimError::LockPoisoned)? {
            return Ok(count);
        }

        let mut slot = self.doc_count.write().map_err(|_| ZimError::LockPoisoned)?;
        // Another thread may have filled the cache while we waited.
        if let Some(count) = *slot {
            return Ok(count);
        }

        let searcher = self.reader.searcher();
        let count = searcher.search(&AllQuery, &Count)? as u64;
        debug!("document count: {count} (cached)");
        *slot = Some(count);
        Ok(count)
    }

    /// Picks a uniformly random indexed article and returns its directory
    /// index. Retrieves the single document at a random offset via a
    /// bounded top-N scan.
    pub fn random_article_index(&self) -> Result<u32> {
        let count = self.document_count()?;
        if count == 0 {
            return Err(ZimError::NoArticleFound(0));
        }

        let offset = rand::thread_rng().gen_range(0..count) as usize;
        let searcher = self.reader.searcher();
        let docs = searcher.search(&AllQuery, &TopDocs::with_limit(1).and_offset(offset))?;
        let (_, address) = docs
            .into_iter()
            .next()
            .ok_or(ZimError::NoArticleFound(1))?;
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(self.result_from_doc(&doc, 0.0)?.index)
    }

    fn analyze(&self, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.title)?;
        let mut tokens = Vec::new();
        let mut stream = analyzer.token_stream(text);
        stream.process(&mut |token| tokens.push(token.text.clone()));
        Ok(tokens)
    }

    fn result_from_doc(&self, doc: &TantivyDocument, score: f32) -> Result<SearchResult> {
        // The numeric idx field is authoritative; the id primary key is a
        // decimal rendering of the same value and serves as fallback.
        let index = doc
            .get_first(self.fields.idx)
            .and_then(|value| value.as_u64())
            .or_else(|| {
                doc.get_first(self.fields.id)
                    .and_then(|value| value.as_str())
                    .and_then(|text| text.parse().ok())
            })
            .ok_or_else(|| {
                tantivy::TantivyError::SchemaError("document is missing its entry index".into())
            })?;

        let url = doc
            .get_first(self.fields.url)
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();
        let title = doc
            .get_first(self.fields.title)
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(SearchResult {
            index: index as u32,
            url,
            title,
            score,
        })
    }
}

fn boosted(query: Box<dyn Query>, boost: f32) -> Box<dyn Query> {
    Box::new(BoostQuery::new(query, boost))
}
