//! File search facade
//!
//! The three calls an application makes: prime the scope when the search box
//! gains focus, search on every keystroke, and count what the index holds.
//!
//! ```no_run
//! use searchprime::search::FileSearchProvider;
//! use searchprime::service::memory::{MemoryIndex, MemoryItem};
//! use searchprime::query::QueryExecutor;
//!
//! let index = MemoryIndex::from_items(vec![MemoryItem::file("C:/docs/report.docx")]);
//! let mut provider = FileSearchProvider::new(QueryExecutor::new(index));
//!
//! provider.prepare(&["C:/docs"], &[]).unwrap();
//! for result in provider.search("report").unwrap() {
//!     println!("{}", result.url);
//! }
//! ```

use crate::error::SearchResult;
use crate::query::{
    COUNT_ALL_SQL, PrimingSession, QueryExecutor, QueryText, ResultRecord, RowEnumerator,
    ScopeList,
};
use crate::service::ServiceRegistry;
use std::ops::ControlFlow;

/// A single search hit
pub type QueryResult = ResultRecord;

/// Per-search knobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Stop after this many results
    pub max_results: Option<usize>,
}

impl SearchOptions {
    pub fn limit(max_results: usize) -> Self {
        Self {
            max_results: Some(max_results),
        }
    }
}

pub struct FileSearchProvider {
    session: PrimingSession,
    enumerator: RowEnumerator,
}

impl FileSearchProvider {
    pub fn new(executor: QueryExecutor) -> Self {
        Self::with_enumerator(executor, RowEnumerator::default())
    }

    pub fn with_enumerator(executor: QueryExecutor, enumerator: RowEnumerator) -> Self {
        Self {
            session: PrimingSession::new(executor),
            enumerator,
        }
    }

    /// Provider over the registry's query service
    pub fn from_registry(registry: &ServiceRegistry, batch_size: usize) -> SearchResult<Self> {
        Ok(Self::with_enumerator(
            QueryExecutor::from_registry(registry)?,
            RowEnumerator::new(batch_size),
        ))
    }

    pub fn session(&self) -> &PrimingSession {
        &self.session
    }

    pub fn is_prepared(&self) -> bool {
        self.session.is_primed()
    }

    /// Prime the scope. An empty `included` list searches everything.
    /// Calling again replaces the previous priming query.
    pub fn prepare<S: AsRef<str>>(&mut self, included: &[S], excluded: &[S]) -> SearchResult<()> {
        let scopes = ScopeList::new(
            included.iter().map(|s| s.as_ref().to_string()),
            excluded.iter().map(|s| s.as_ref().to_string()),
        );
        self.session.prepare(&scopes)
    }

    pub fn search(&self, search_text: &str) -> SearchResult<Vec<QueryResult>> {
        self.search_with_options(search_text, &SearchOptions::default())
    }

    pub fn search_with_options(
        &self,
        search_text: &str,
        options: &SearchOptions,
    ) -> SearchResult<Vec<QueryResult>> {
        let mut cursor = self.session.search(search_text)?;
        let mut results = Vec::new();

        if options.max_results == Some(0) {
            return Ok(results);
        }

        let summary = self.enumerator.for_each(&mut cursor, |record| {
            results.push(record);
            match options.max_results {
                Some(max) if results.len() >= max => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })?;

        log::debug!(
            "search '{}' returned {} results in {} rounds",
            search_text,
            summary.delivered,
            summary.rounds
        );
        Ok(results)
    }

    /// Count every item in the index without resolving any properties
    pub fn count_all(&self) -> SearchResult<u64> {
        let mut cursor = self
            .session
            .executor()
            .execute(&QueryText::new(COUNT_ALL_SQL))?;
        self.enumerator.count(&mut cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::service::memory::{MemoryIndex, MemoryItem};
    use std::sync::Arc;

    fn provider() -> (Arc<MemoryIndex>, FileSearchProvider) {
        let index = MemoryIndex::from_items(
            (0..12)
                .map(|i| MemoryItem::file(&format!("C:/docs/report{}.txt", i)).with_contents("quarterly report"))
                .chain([MemoryItem::file("C:/music/track.mp3")]),
        );
        let provider = FileSearchProvider::with_enumerator(QueryExecutor::new(index.clone()), RowEnumerator::new(5));
        (index, provider)
    }

    #[test]
    fn test_search_requires_prepare() {
        let (_index, provider) = provider();
        assert!(!provider.is_prepared());
        assert!(matches!(provider.search("report"), Err(SearchError::NotPrimed)));
    }

    #[test]
    fn test_search_materializes_results() {
        let (index, mut provider) = provider();
        provider.prepare(&["C:/docs"], &[]).unwrap();

        let results = provider.search("quarterly").unwrap();
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.url.starts_with("file:C:/docs/")));

        let stats = index.stats();
        assert_eq!(stats.outstanding_rows, 0);
        // priming cursor stays open, the search cursor is released
        assert_eq!(stats.open_cursors, 1);
    }

    #[test]
    fn test_max_results_stops_early() {
        let (index, mut provider) = provider();
        provider.prepare(&["C:/docs"], &[]).unwrap();

        let results = provider
            .search_with_options("report*", &SearchOptions::limit(3))
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(index.stats().outstanding_rows, 0);

        let none = provider
            .search_with_options("report*", &SearchOptions::limit(0))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_count_all_is_unscoped() {
        let (index, mut provider) = provider();
        provider.prepare(&["C:/music"], &[]).unwrap();

        assert_eq!(provider.count_all().unwrap(), 13);
        assert_eq!(index.stats().properties_resolved, 0);
    }

    #[test]
    fn test_many_keystrokes_reuse_one_plan() {
        let (index, mut provider) = provider();
        provider.prepare(&["C:/docs"], &[]).unwrap();

        for text in ["q", "qu", "qua", "quar"] {
            provider.search(&format!("{}*", text)).unwrap();
        }

        let stats = index.stats();
        assert_eq!(stats.full_scans, 1);
        assert_eq!(stats.reused_plans, 4);
    }
}
