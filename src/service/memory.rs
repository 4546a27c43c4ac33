//! In-process system index
//!
//! Implements the query and administration seams over a list of items held in
//! memory. Every executed cursor gets a where id naming the item set it
//! resolved; `REUSEWHERE(id)` evaluates a later query against that set instead
//! of scanning the whole index, for as long as the minting cursor stays open.

use crate::error::{ServiceError, ServiceResult};
use crate::service::sql::{Predicate, parse_select};
use crate::service::{
    CONTENTS, CatalogManager, Command, Connection, CrawlScopeManager, Execution, FILE_EXTENSION,
    ITEM_NAME, ITEM_PATH_DISPLAY, ITEM_URL, PropertyBag, PropertyValue, QueryService, RowHandle,
    Rowset, SIZE, SYSTEM_INDEX, SearchBackend, SearchManager, normalize_separators,
};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Largest file whose text is indexed as contents during a crawl
const MAX_CONTENT_BYTES: u64 = 64 * 1024;

/// Executed query texts kept for inspection
pub const EXECUTED_HISTORY: usize = 256;

/// One indexed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryItem {
    pub properties: PropertyBag,
}

impl MemoryItem {
    /// Item for a file path; fills url, name, display path and extension
    pub fn file(path: &str) -> Self {
        let normalized = normalize_separators(path);
        let name = normalized.rsplit('/').next().unwrap_or_default().to_string();

        let mut properties = PropertyBag::new();
        properties.insert(ITEM_URL.to_string(), format!("file:{}", normalized).into());
        properties.insert(ITEM_PATH_DISPLAY.to_string(), path.into());
        if let Some((stem, ext)) = name.rsplit_once('.')
            && !stem.is_empty()
        {
            properties.insert(FILE_EXTENSION.to_string(), format!(".{}", ext).into());
        }
        properties.insert(ITEM_NAME.to_string(), name.into());

        Self { properties }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn with_contents(self, text: &str) -> Self {
        self.with_property(CONTENTS, text)
    }

    pub fn url(&self) -> &str {
        self.text(ITEM_URL)
    }

    fn text(&self, name: &str) -> &str {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
    }

    /// Text CONTAINS is evaluated against
    fn haystack(&self) -> String {
        format!(
            "{} {} {}",
            self.text(ITEM_NAME),
            self.text(ITEM_PATH_DISPLAY),
            self.text(CONTENTS)
        )
    }
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub items: usize,
    pub queries_executed: u64,
    /// Queries that resolved their scope by scanning every item
    pub full_scans: u64,
    /// Queries evaluated against a previously resolved plan
    pub reused_plans: u64,
    pub open_cursors: usize,
    pub outstanding_rows: usize,
    pub fetch_calls: u64,
    pub properties_resolved: u64,
    /// Search manager, catalog and crawl scope handles handed out
    pub admin_handles_created: u64,
}

#[derive(Default)]
struct EngineState {
    next_cursor: u64,
    next_where_id: u32,
    next_row: u64,
    /// Live plans by where id
    plans: HashMap<u32, Arc<Vec<usize>>>,
    /// Pinned rows: handle -> (cursor, item index)
    outstanding: HashMap<RowHandle, (u64, usize)>,
    executed: VecDeque<String>,
    stats: MemoryStats,
}

struct Shared {
    items: Vec<MemoryItem>,
    crawl_roots: Vec<String>,
    state: Mutex<EngineState>,
    online: AtomicBool,
    reuse_supported: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> ServiceResult<()> {
        if self.online.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ServiceError::Server("index service is offline".to_string()))
        }
    }
}

/// In-memory system index; cheap to clone
#[derive(Clone)]
pub struct MemoryIndex {
    shared: Arc<Shared>,
}

impl MemoryIndex {
    /// Index `items`; `crawl_roots` define what counts as inside the crawl scope
    pub fn new<I, S>(items: I, crawl_roots: &[S]) -> Arc<Self>
    where
        I: IntoIterator<Item = MemoryItem>,
        S: AsRef<str>,
    {
        let items: Vec<MemoryItem> = items.into_iter().collect();
        let state = EngineState {
            next_cursor: 1,
            next_where_id: 1,
            next_row: 1,
            ..Default::default()
        };

        Arc::new(Self {
            shared: Arc::new(Shared {
                items,
                crawl_roots: crawl_roots
                    .iter()
                    .map(|r| normalize_separators(r.as_ref()))
                    .collect(),
                state: Mutex::new(state),
                online: AtomicBool::new(true),
                reuse_supported: AtomicBool::new(true),
            }),
        })
    }

    /// Index with an empty crawl scope
    pub fn from_items<I: IntoIterator<Item = MemoryItem>>(items: I) -> Arc<Self> {
        Self::new(items, &[] as &[&str])
    }

    /// Walk `roots` and index every regular file below them.
    /// `on_item` is called once per indexed file.
    pub fn crawl<P: AsRef<Path>>(roots: &[P], mut on_item: impl FnMut(&Path)) -> ServiceResult<Arc<Self>> {
        let mut items = Vec::new();
        let mut root_names = Vec::new();

        for root in roots {
            let root = root.as_ref();
            if !root.exists() {
                return Err(ServiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("crawl root not found: {}", root.display()),
                )));
            }
            root_names.push(root.to_string_lossy().into_owned());

            let walker = ignore::WalkBuilder::new(root)
                .hidden(true)
                .git_ignore(false)
                .git_global(false)
                .git_exclude(false)
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        log::debug!("skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }
                let path = entry.path();
                items.push(crawl_item(path));
                on_item(path);
            }
        }

        log::info!("crawled {} items from {} roots", items.len(), roots.len());
        Ok(Self::new(items, &root_names))
    }

    pub fn len(&self) -> usize {
        self.shared.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.is_empty()
    }

    pub fn crawl_roots(&self) -> &[String] {
        &self.shared.crawl_roots
    }

    /// Take the service offline: every call fails until it comes back
    pub fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::Relaxed);
    }

    /// Whether rowsets expose their where id
    pub fn set_reuse_supported(&self, supported: bool) {
        self.shared.reuse_supported.store(supported, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.shared.state();
        MemoryStats {
            items: self.shared.items.len(),
            outstanding_rows: state.outstanding.len(),
            ..state.stats
        }
    }

    /// The last [`EXECUTED_HISTORY`] query texts executed, oldest first.
    /// `MemoryStats::queries_executed` keeps the full count.
    pub fn executed_queries(&self) -> Vec<String> {
        self.shared.state().executed.iter().cloned().collect()
    }
}

fn crawl_item(path: &Path) -> MemoryItem {
    let mut item = MemoryItem::file(&path.to_string_lossy());
    if let Ok(meta) = path.metadata() {
        item = item.with_property(SIZE, meta.len() as i64);
        if meta.len() <= MAX_CONTENT_BYTES
            && let Ok(text) = fs::read_to_string(path)
        {
            item = item.with_contents(&text);
        }
    }
    item
}

/// `url` lies at or below `scope` (both `file:` urls, case-insensitive)
fn in_scope(url: &str, scope: &str) -> bool {
    let url = url.to_lowercase();
    let scope = scope.to_lowercase();
    if scope == "file:" {
        return true;
    }
    match url.strip_prefix(&scope) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || scope.ends_with('/'),
        None => false,
    }
}

/// Predicate with CONTAINS terms compiled and REUSEWHERE plans resolved
enum Compiled {
    Scope { url: String, negated: bool },
    Contains(Vec<Regex>),
    Plan(Arc<Vec<usize>>),
    And(Vec<Compiled>),
    Or(Vec<Compiled>),
}

impl Compiled {
    fn build(predicate: &Predicate, plans: &HashMap<u32, Arc<Vec<usize>>>) -> ServiceResult<Self> {
        Ok(match predicate {
            Predicate::Scope { url, negated } => Compiled::Scope {
                url: url.clone(),
                negated: *negated,
            },
            Predicate::Contains(text) => Compiled::Contains(contains_terms(text)?),
            Predicate::ReuseWhere(id) => Compiled::Plan(
                plans
                    .get(id)
                    .cloned()
                    .ok_or(ServiceError::StaleReuseToken(*id))?,
            ),
            Predicate::And(terms) => Compiled::And(
                terms
                    .iter()
                    .map(|t| Compiled::build(t, plans))
                    .collect::<ServiceResult<_>>()?,
            ),
            Predicate::Or(terms) => Compiled::Or(
                terms
                    .iter()
                    .map(|t| Compiled::build(t, plans))
                    .collect::<ServiceResult<_>>()?,
            ),
        })
    }

    fn matches(&self, index: usize, item: &MemoryItem) -> bool {
        match self {
            Compiled::Scope { url, negated } => in_scope(item.url(), url) != *negated,
            Compiled::Contains(terms) => {
                let haystack = item.haystack();
                terms.iter().all(|re| re.is_match(&haystack))
            }
            Compiled::Plan(plan) => plan.binary_search(&index).is_ok(),
            Compiled::And(terms) => terms.iter().all(|t| t.matches(index, item)),
            Compiled::Or(terms) => terms.iter().any(|t| t.matches(index, item)),
        }
    }
}

/// Word regexes for a CONTAINS argument. A trailing `*` makes a prefix term.
fn contains_terms(text: &str) -> ServiceResult<Vec<Regex>> {
    let text = text.trim().trim_matches('"');
    text.split_whitespace()
        .map(|term| {
            let (word, prefix) = match term.strip_suffix('*') {
                Some(w) => (w, true),
                None => (term, false),
            };
            let pattern = if prefix {
                format!(r"(?i)\b{}", regex::escape(word))
            } else {
                format!(r"(?i)\b{}\b", regex::escape(word))
            };
            Regex::new(&pattern).map_err(|e| ServiceError::Syntax {
                offset: 0,
                message: e.to_string(),
            })
        })
        .collect()
}

impl QueryService for MemoryIndex {
    fn connect(&self) -> ServiceResult<Box<dyn Connection>> {
        self.shared.check_online()?;
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
}

impl Connection for MemoryConnection {
    fn create_command(&mut self) -> ServiceResult<Box<dyn Command>> {
        self.shared.check_online()?;
        Ok(Box::new(MemoryCommand {
            shared: Arc::clone(&self.shared),
            text: None,
        }))
    }
}

struct MemoryCommand {
    shared: Arc<Shared>,
    text: Option<String>,
}

impl Command for MemoryCommand {
    fn set_text(&mut self, sql: &str) -> ServiceResult<()> {
        self.text = Some(sql.to_string());
        Ok(())
    }

    fn execute(&mut self) -> ServiceResult<Execution> {
        self.shared.check_online()?;
        let text = self.text.as_deref().ok_or(ServiceError::NoCommandText)?;
        let stmt = parse_select(text)?;
        if !stmt.catalog.eq_ignore_ascii_case(SYSTEM_INDEX) {
            return Err(ServiceError::UnknownCatalog(stmt.catalog));
        }

        let mut state = self.shared.state();
        if state.executed.len() == EXECUTED_HISTORY {
            state.executed.pop_front();
        }
        state.executed.push_back(text.to_string());
        state.stats.queries_executed += 1;

        let reuse = stmt.predicate.as_ref().and_then(Predicate::reuse_where);
        let compiled = stmt
            .predicate
            .as_ref()
            .map(|p| Compiled::build(p, &state.plans))
            .transpose()?;

        let items = &self.shared.items;
        let candidates: Vec<usize> = match reuse {
            Some(id) => {
                state.stats.reused_plans += 1;
                // validated by Compiled::build
                state.plans.get(&id).map(|p| p.to_vec()).unwrap_or_default()
            }
            None => {
                state.stats.full_scans += 1;
                (0..items.len()).collect()
            }
        };

        let matches: Vec<usize> = candidates
            .into_iter()
            .filter(|&i| compiled.as_ref().is_none_or(|c| c.matches(i, &items[i])))
            .collect();
        let matches = Arc::new(matches);

        let cursor_id = state.next_cursor;
        state.next_cursor += 1;
        let where_id = state.next_where_id;
        state.next_where_id += 1;
        state.plans.insert(where_id, Arc::clone(&matches));
        state.stats.open_cursors += 1;

        let row_count = matches.len() as u64;
        Ok(Execution {
            rowset: Box::new(MemoryRowset {
                shared: Arc::clone(&self.shared),
                cursor_id,
                where_id,
                matches,
                position: 0,
                closed: false,
            }),
            row_count: Some(row_count),
        })
    }
}

struct MemoryRowset {
    shared: Arc<Shared>,
    cursor_id: u64,
    where_id: u32,
    matches: Arc<Vec<usize>>,
    position: usize,
    closed: bool,
}

impl MemoryRowset {
    fn check(&self) -> ServiceResult<()> {
        self.shared.check_online()?;
        if self.closed {
            return Err(ServiceError::CursorClosed);
        }
        Ok(())
    }

    fn release_cursor(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut state = self.shared.state();
        state.plans.remove(&self.where_id);
        let cursor_id = self.cursor_id;
        state.outstanding.retain(|_, (owner, _)| *owner != cursor_id);
        state.stats.open_cursors = state.stats.open_cursors.saturating_sub(1);
    }
}

impl Rowset for MemoryRowset {
    fn where_id(&self) -> ServiceResult<Option<u32>> {
        self.check()?;
        if self.shared.reuse_supported.load(Ordering::Relaxed) {
            Ok(Some(self.where_id))
        } else {
            Ok(None)
        }
    }

    fn next_rows(&mut self, max: usize) -> ServiceResult<Vec<RowHandle>> {
        self.check()?;
        let end = self.position.saturating_add(max).min(self.matches.len());

        let mut state = self.shared.state();
        state.stats.fetch_calls += 1;

        let mut handles = Vec::with_capacity(end - self.position);
        for &item in &self.matches[self.position..end] {
            let handle = RowHandle(state.next_row);
            state.next_row += 1;
            state.outstanding.insert(handle, (self.cursor_id, item));
            handles.push(handle);
        }
        self.position = end;
        Ok(handles)
    }

    fn row_properties(&self, row: RowHandle) -> ServiceResult<PropertyBag> {
        self.check()?;
        let mut state = self.shared.state();
        let pinned = state.outstanding.get(&row).copied();
        match pinned {
            Some((owner, item)) if owner == self.cursor_id => {
                state.stats.properties_resolved += 1;
                Ok(self.shared.items[item].properties.clone())
            }
            _ => Err(ServiceError::UnknownRow(row.0)),
        }
    }

    fn release_rows(&mut self, rows: &[RowHandle]) -> ServiceResult<()> {
        self.check()?;
        let mut state = self.shared.state();
        for row in rows {
            let pinned = state.outstanding.get(row).copied();
            match pinned {
                Some((owner, _)) if owner == self.cursor_id => {
                    state.outstanding.remove(row);
                }
                _ => return Err(ServiceError::UnknownRow(row.0)),
            }
        }
        Ok(())
    }

    fn close(&mut self) -> ServiceResult<()> {
        self.check()?;
        self.release_cursor();
        Ok(())
    }
}

impl Drop for MemoryRowset {
    fn drop(&mut self) {
        self.release_cursor();
    }
}

struct MemorySearchManager {
    shared: Arc<Shared>,
}

struct MemoryCatalog {
    shared: Arc<Shared>,
}

struct MemoryCrawlScope {
    shared: Arc<Shared>,
}

impl SearchManager for MemorySearchManager {
    fn catalog(&self, name: &str) -> ServiceResult<Arc<dyn CatalogManager>> {
        self.shared.check_online()?;
        if !name.eq_ignore_ascii_case(SYSTEM_INDEX) {
            return Err(ServiceError::UnknownCatalog(name.to_string()));
        }
        self.shared.state().stats.admin_handles_created += 1;
        Ok(Arc::new(MemoryCatalog {
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl CatalogManager for MemoryCatalog {
    fn crawl_scope_manager(&self) -> ServiceResult<Arc<dyn CrawlScopeManager>> {
        self.shared.check_online()?;
        self.shared.state().stats.admin_handles_created += 1;
        Ok(Arc::new(MemoryCrawlScope {
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl CrawlScopeManager for MemoryCrawlScope {
    fn included_in_crawl_scope(&self, path: &str) -> ServiceResult<bool> {
        self.shared.check_online()?;
        let url = format!("file:{}", normalize_separators(path));
        Ok(self
            .shared
            .crawl_roots
            .iter()
            .any(|root| in_scope(&url, &format!("file:{}", root))))
    }
}

impl SearchBackend for MemoryIndex {
    fn search_manager(&self) -> ServiceResult<Arc<dyn SearchManager>> {
        self.shared.check_online()?;
        self.shared.state().stats.admin_handles_created += 1;
        Ok(Arc::new(MemorySearchManager {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn query_service(&self) -> ServiceResult<Arc<dyn QueryService>> {
        Ok(Arc::new(self.clone()))
    }
}
