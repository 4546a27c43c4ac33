use crate::error::{ExecuteStage, SearchError, SearchResult, ServiceError, ServiceResult};
use crate::query::scope::QueryText;
use crate::service::{QueryService, Rowset, ServiceRegistry};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Compiles query text into a command and executes it.
///
/// Every call opens its own connection; nothing is pooled here.
#[derive(Clone)]
pub struct QueryExecutor {
    service: Arc<dyn QueryService>,
}

impl QueryExecutor {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Build an executor from the application's registry
    pub fn from_registry(registry: &ServiceRegistry) -> SearchResult<Self> {
        let service = registry
            .query_service()
            .map_err(|e| SearchError::execution(ExecuteStage::Connect, e))?;
        Ok(Self::new(service))
    }

    /// Execute `query` and hand ownership of the resulting cursor to the caller
    pub fn execute(&self, query: &QueryText) -> SearchResult<ResultCursor> {
        let start = Instant::now();

        let mut connection = self
            .service
            .connect()
            .map_err(|e| SearchError::execution(ExecuteStage::Connect, e))?;

        let mut command = connection
            .create_command()
            .map_err(|e| SearchError::execution(ExecuteStage::CreateCommand, e))?;

        command
            .set_text(query.as_str())
            .map_err(|e| SearchError::execution(ExecuteStage::SetText, e))?;

        let execution = command
            .execute()
            .map_err(|e| SearchError::execution(ExecuteStage::Execute, e))?;

        log::debug!(
            "executed in {:.2}ms (rows: {:?}): {}",
            start.elapsed().as_secs_f64() * 1000.0,
            execution.row_count,
            query
        );

        Ok(ResultCursor {
            rowset: execution.rowset,
            row_count: execution.row_count,
            query: query.clone(),
            closed: false,
        })
    }
}

/// Owned handle to a server-side cursor. Closed exactly once, on `close` or drop.
pub struct ResultCursor {
    rowset: Box<dyn Rowset>,
    row_count: Option<u64>,
    query: QueryText,
    closed: bool,
}

impl ResultCursor {
    /// Text of the query that produced this cursor
    pub fn query(&self) -> &QueryText {
        &self.query
    }

    /// Row count reported at execution time, if known
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the server-side cursor. Calling it again is a no-op.
    pub fn close(&mut self) -> ServiceResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.rowset.close()
    }

    pub(crate) fn rowset(&self) -> ServiceResult<&dyn Rowset> {
        if self.closed {
            return Err(ServiceError::CursorClosed);
        }
        Ok(self.rowset.as_ref())
    }

    pub(crate) fn rowset_mut(&mut self) -> ServiceResult<&mut dyn Rowset> {
        if self.closed {
            return Err(ServiceError::CursorClosed);
        }
        Ok(self.rowset.as_mut())
    }
}

impl fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("query", &self.query)
            .field("row_count", &self.row_count)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to release cursor for `{}`: {}", self.query, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::{MemoryIndex, MemoryItem};

    fn index() -> Arc<MemoryIndex> {
        MemoryIndex::from_items(vec![
            MemoryItem::file("/home/a/docs/report.txt"),
            MemoryItem::file("/home/a/docs/notes.md"),
            MemoryItem::file("/home/a/music/song.mp3"),
        ])
    }

    #[test]
    fn test_execute_returns_open_cursor() {
        let index = index();
        let executor = QueryExecutor::new(index.clone());
        let cursor = executor
            .execute(&QueryText::new("SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE='file:/home/a/docs'"))
            .unwrap();

        assert!(!cursor.is_closed());
        assert_eq!(cursor.row_count(), Some(2));
        assert_eq!(index.stats().open_cursors, 1);
    }

    #[test]
    fn test_cursor_released_on_drop() {
        let index = index();
        let executor = QueryExecutor::new(index.clone());
        {
            let _cursor = executor
                .execute(&QueryText::new("SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE='file:'"))
                .unwrap();
            assert_eq!(index.stats().open_cursors, 1);
        }
        assert_eq!(index.stats().open_cursors, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let index = index();
        let executor = QueryExecutor::new(index.clone());
        let mut cursor = executor
            .execute(&QueryText::new("SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE='file:'"))
            .unwrap();

        cursor.close().unwrap();
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        assert!(matches!(cursor.rowset(), Err(ServiceError::CursorClosed)));
        assert_eq!(index.stats().open_cursors, 0);
    }

    #[test]
    fn test_syntax_error_reports_execute_stage() {
        let executor = QueryExecutor::new(index());
        let err = executor
            .execute(&QueryText::new("SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE='file:it's'"))
            .unwrap_err();

        match err {
            SearchError::QueryExecutionFailed { stage, .. } => {
                assert_eq!(stage, ExecuteStage::Execute)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_offline_service_reports_connect_stage() {
        let index = index();
        index.set_online(false);
        let executor = QueryExecutor::new(index);
        let err = executor.execute(&QueryText::new("SELECT System.ItemUrl FROM SystemIndex WHERE SCOPE='file:'"));

        assert!(matches!(
            err,
            Err(SearchError::QueryExecutionFailed { stage: ExecuteStage::Connect, .. })
        ));
    }
}
