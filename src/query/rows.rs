//! Batched, forward-only row enumeration
//!
//! Rows are fetched in bounded batches. Each batch is released before the next
//! fetch, and whatever is still pinned when enumeration stops early (consumer
//! break, error, or the iterator being dropped) is released too.

use crate::error::{SearchError, SearchResult};
use crate::query::executor::ResultCursor;
use crate::service::{ITEM_URL, PropertyBag, RowHandle};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Rows requested per round trip
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Largest batch a single fetch may ask for
pub const MAX_BATCH_SIZE: usize = 100_000;

/// One matched item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Primary identifier (`System.ItemUrl`)
    pub url: String,
    pub properties: PropertyBag,
}

impl ResultRecord {
    pub fn from_properties(properties: PropertyBag) -> Self {
        let url = properties
            .get(ITEM_URL)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Self { url, properties }
    }

    /// Native path for `file:` urls
    pub fn path(&self) -> Option<&str> {
        self.url.strip_prefix("file:")
    }
}

/// What a full enumeration did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationSummary {
    pub delivered: u64,
    /// Fetches that returned at least one row
    pub rounds: usize,
    pub stopped_early: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RowEnumerator {
    batch_size: usize,
}

impl Default for RowEnumerator {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl RowEnumerator {
    /// A zero batch size falls back to the default; larger ones are capped at
    /// [`MAX_BATCH_SIZE`]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size.min(MAX_BATCH_SIZE)
        };
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Lazy record sequence over `cursor`. Not restartable.
    pub fn rows<'c>(&self, cursor: &'c mut ResultCursor) -> Rows<'c> {
        Rows {
            cursor,
            batch_size: self.batch_size,
            pending: Vec::new(),
            next: 0,
            done: false,
            rounds: 0,
            delivered: 0,
        }
    }

    /// Feed every record to `on_row` until exhausted or it breaks
    pub fn for_each<F>(&self, cursor: &mut ResultCursor, mut on_row: F) -> SearchResult<EnumerationSummary>
    where
        F: FnMut(ResultRecord) -> ControlFlow<()>,
    {
        let mut rows = self.rows(cursor);
        let mut stopped_early = false;

        while let Some(record) = rows.next() {
            if on_row(record?).is_break() {
                stopped_early = true;
                break;
            }
        }

        let summary = EnumerationSummary {
            delivered: rows.delivered,
            rounds: rows.rounds,
            stopped_early,
        };
        rows.finish()?;
        Ok(summary)
    }

    /// Count rows without resolving any properties
    pub fn count(&self, cursor: &mut ResultCursor) -> SearchResult<u64> {
        let rowset = cursor.rowset_mut().map_err(SearchError::EnumerationFailed)?;
        let mut total = 0u64;

        loop {
            let rows = rowset
                .next_rows(self.batch_size)
                .map_err(SearchError::EnumerationFailed)?;
            if rows.is_empty() {
                break;
            }
            total += rows.len() as u64;
            rowset
                .release_rows(&rows)
                .map_err(SearchError::EnumerationFailed)?;
        }

        Ok(total)
    }
}

/// Iterator over the records of one cursor
pub struct Rows<'c> {
    cursor: &'c mut ResultCursor,
    batch_size: usize,
    pending: Vec<RowHandle>,
    next: usize,
    done: bool,
    rounds: usize,
    delivered: u64,
}

impl Rows<'_> {
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Release whatever batch is still pinned and report failures
    pub fn finish(mut self) -> SearchResult<()> {
        self.done = true;
        self.release_pending()
    }

    fn release_pending(&mut self) -> SearchResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let handles = std::mem::take(&mut self.pending);
        self.next = 0;
        self.cursor
            .rowset_mut()
            .and_then(|rowset| rowset.release_rows(&handles))
            .map_err(SearchError::EnumerationFailed)
    }

    fn fail(&mut self, err: SearchError) -> Option<SearchResult<ResultRecord>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for Rows<'_> {
    type Item = SearchResult<ResultRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.next < self.pending.len() {
                let handle = self.pending[self.next];
                self.next += 1;

                let resolved = self
                    .cursor
                    .rowset()
                    .and_then(|rowset| rowset.row_properties(handle));
                return match resolved {
                    Ok(properties) => {
                        self.delivered += 1;
                        Some(Ok(ResultRecord::from_properties(properties)))
                    }
                    Err(e) => self.fail(SearchError::EnumerationFailed(e)),
                };
            }

            if let Err(e) = self.release_pending() {
                return self.fail(e);
            }

            let batch_size = self.batch_size;
            let fetched = self
                .cursor
                .rowset_mut()
                .and_then(|rowset| rowset.next_rows(batch_size));
            match fetched {
                Ok(handles) if handles.is_empty() => {
                    self.done = true;
                    return None;
                }
                Ok(handles) => {
                    log::trace!("fetched batch of {} rows", handles.len());
                    self.rounds += 1;
                    self.pending = handles;
                }
                Err(e) => return self.fail(SearchError::EnumerationFailed(e)),
            }
        }
    }
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        let pinned = self.pending.len();
        if let Err(e) = self.release_pending() {
            log::warn!("failed to release {} pinned rows: {}", pinned, e);
        }
    }
}
