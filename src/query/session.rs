//! Priming session state machine
//!
//! A session is either empty or primed with exactly one `(query, cursor)`
//! pair. Priming resolves the scope once; every later search derives a
//! narrowed query that points the engine back at that resolved scope through
//! a reuse token read fresh from the live priming cursor.
//!
//! A session is not safe for concurrent use. Serialize access externally or
//! use one session per thread.

use crate::error::{SearchError, SearchResult};
use crate::query::executor::{QueryExecutor, ResultCursor};
use crate::query::reuse::{ReuseToken, extract_reuse_token};
use crate::query::scope::{QueryText, ScopeList};

/// The live priming pair
struct PrimingState {
    query: QueryText,
    cursor: ResultCursor,
}

pub struct PrimingSession {
    executor: QueryExecutor,
    state: Option<PrimingState>,
}

impl PrimingSession {
    pub fn new(executor: QueryExecutor) -> Self {
        Self {
            executor,
            state: None,
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn is_primed(&self) -> bool {
        self.state.is_some()
    }

    /// Query text of the current priming pair
    pub fn primed_query(&self) -> Option<&QueryText> {
        self.state.as_ref().map(|s| &s.query)
    }

    /// Execute the scope-only query and make it the session's priming pair.
    ///
    /// The previous pair is released only after the new cursor exists, so a
    /// failure leaves the session exactly as it was.
    pub fn prepare(&mut self, scopes: &ScopeList) -> SearchResult<()> {
        let query = scopes.to_query();
        let cursor = self.executor.execute(&query)?;

        if let Some(mut previous) = self.state.take() {
            if let Err(e) = previous.cursor.close() {
                log::warn!("failed to release previous priming cursor: {}", e);
            }
        }

        log::info!(
            "primed {} included / {} excluded scopes ({:?} rows)",
            scopes.included.len(),
            scopes.excluded.len(),
            cursor.row_count()
        );
        self.state = Some(PrimingState { query, cursor });
        Ok(())
    }

    /// Token for the current priming cursor, read fresh on every call
    pub fn reuse_token(&self) -> SearchResult<ReuseToken> {
        let state = self.state.as_ref().ok_or(SearchError::NotPrimed)?;
        extract_reuse_token(&state.cursor)
    }

    /// Narrow the priming query by `search_text`, reusing its scope plan.
    /// Does not execute anything.
    pub fn derive_search_query(&self, search_text: &str) -> SearchResult<QueryText> {
        let state = self.state.as_ref().ok_or(SearchError::NotPrimed)?;
        let token = extract_reuse_token(&state.cursor)?;

        Ok(state.query.with_clause(&format!(
            "AND CONTAINS('{}') AND {}",
            search_text,
            token.reuse_clause()
        )))
    }

    /// Derive and execute the narrowed query, returning its cursor
    pub fn search(&self, search_text: &str) -> SearchResult<ResultCursor> {
        let query = self.derive_search_query(search_text)?;
        self.executor.execute(&query)
    }
}
