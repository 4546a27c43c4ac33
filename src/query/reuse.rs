//! Reuse tokens: naming scope resolution work a live cursor already did

use crate::error::{SearchError, SearchResult};
use crate::query::executor::ResultCursor;
use std::fmt;

/// Engine identifier of a resolved scope plan.
///
/// Only meaningful while the cursor it was read from stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReuseToken(u32);

impl ReuseToken {
    pub fn id(self) -> u32 {
        self.0
    }

    /// Clause telling the engine to reuse this plan
    pub fn reuse_clause(self) -> String {
        format!("REUSEWHERE({})", self.0)
    }
}

impl fmt::Display for ReuseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read the reuse token from `cursor` without moving its row position
pub fn extract_reuse_token(cursor: &ResultCursor) -> SearchResult<ReuseToken> {
    let rowset = cursor
        .rowset()
        .map_err(|e| SearchError::ReuseTokenUnavailable(e.to_string()))?;

    match rowset.where_id() {
        Ok(Some(id)) => Ok(ReuseToken(id)),
        Ok(None) => Err(SearchError::ReuseTokenUnavailable(
            "cursor does not expose a where id".to_string(),
        )),
        Err(e) => Err(SearchError::ReuseTokenUnavailable(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::executor::QueryExecutor;
    use crate::query::rows::RowEnumerator;
    use crate::query::scope::build_priming_sql;
    use crate::service::memory::{MemoryIndex, MemoryItem};

    fn primed() -> (std::sync::Arc<MemoryIndex>, ResultCursor) {
        let index = MemoryIndex::from_items(
            (0..5).map(|i| MemoryItem::file(&format!("/srv/docs/file{}.txt", i))),
        );
        let cursor = QueryExecutor::new(index.clone())
            .execute(&build_priming_sql(&["/srv/docs"], &[]))
            .unwrap();
        (index, cursor)
    }

    #[test]
    fn test_token_stable_while_open() {
        let (_index, cursor) = primed();
        let first = extract_reuse_token(&cursor).unwrap();
        let second = extract_reuse_token(&cursor).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_does_not_advance_rows() {
        let (_index, mut cursor) = primed();
        extract_reuse_token(&cursor).unwrap();
        let count = RowEnumerator::new(2).count(&mut cursor).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_token_unavailable_after_close() {
        let (_index, mut cursor) = primed();
        cursor.close().unwrap();
        assert!(matches!(
            extract_reuse_token(&cursor),
            Err(SearchError::ReuseTokenUnavailable(_))
        ));
    }

    #[test]
    fn test_unsupported_rowset() {
        let index = MemoryIndex::from_items(vec![MemoryItem::file("/a/b.txt")]);
        index.set_reuse_supported(false);
        let cursor = QueryExecutor::new(index)
            .execute(&build_priming_sql(&["/a"], &[]))
            .unwrap();
        assert!(matches!(
            extract_reuse_token(&cursor),
            Err(SearchError::ReuseTokenUnavailable(_))
        ));
    }

    #[test]
    fn test_reuse_clause_format() {
        assert_eq!(ReuseToken(42).reuse_clause(), "REUSEWHERE(42)");
    }
}
