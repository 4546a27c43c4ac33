//! Seams to the external collaborators
//!
//! The core never talks to an index directly. It goes through these traits:
//!
//! - [`QueryService`] / [`Connection`] / [`Command`] / [`Rowset`] - the
//!   query-execution service (connect, compile text, execute, iterate)
//! - [`SearchManager`] / [`CatalogManager`] / [`CrawlScopeManager`] - index
//!   administration, only used for crawl scope checks
//! - [`SearchBackend`] - hands out both of the above
//!
//! Two backends ship with the crate: [`memory::MemoryIndex`] (in process) and
//! `server::RemoteBackend` (a daemon over a Unix socket).

pub mod memory;
pub mod registry;
pub mod sql;

pub use memory::MemoryIndex;
pub use registry::{CachePolicy, ServiceRegistry};

use crate::error::ServiceResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Column holding the canonical item identifier
pub const ITEM_URL: &str = "System.ItemUrl";
/// File name including extension
pub const ITEM_NAME: &str = "System.ItemName";
/// Native display path
pub const ITEM_PATH_DISPLAY: &str = "System.ItemPathDisplay";
/// Extension with leading dot
pub const FILE_EXTENSION: &str = "System.FileExtension";
/// Size in bytes
pub const SIZE: &str = "System.Size";
/// Indexed text contents
pub const CONTENTS: &str = "System.Search.Contents";

/// Name of the catalog every query targets
pub const SYSTEM_INDEX: &str = "SystemIndex";

/// A single property value on a result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

/// Open property bag resolved from a row handle
pub type PropertyBag = BTreeMap<String, PropertyValue>;

/// Opaque handle to a fetched row; pinned server side until released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowHandle(pub u64);

/// Outcome of executing a command
pub struct Execution {
    pub rowset: Box<dyn Rowset>,
    /// Row count, when the service knows it up front
    pub row_count: Option<u64>,
}

/// Entry point of a query-execution service
pub trait QueryService: Send + Sync {
    /// Open a new connection. Connections are never pooled by the caller.
    fn connect(&self) -> ServiceResult<Box<dyn Connection>>;
}

/// A live connection (data source + session)
pub trait Connection: Send {
    fn create_command(&mut self) -> ServiceResult<Box<dyn Command>>;
}

/// A command scoped to one connection
pub trait Command: Send {
    fn set_text(&mut self, sql: &str) -> ServiceResult<()>;
    fn execute(&mut self) -> ServiceResult<Execution>;
}

/// Server-side iteration state over a query's matching rows
pub trait Rowset: Send {
    /// Engine identifier for the scope resolution this rowset performed.
    /// `Ok(None)` when the rowset does not expose one.
    fn where_id(&self) -> ServiceResult<Option<u32>>;

    /// Fetch up to `max` row handles; an empty vec means the rowset is drained
    fn next_rows(&mut self, max: usize) -> ServiceResult<Vec<RowHandle>>;

    /// Resolve a fetched, unreleased row to its properties
    fn row_properties(&self, row: RowHandle) -> ServiceResult<PropertyBag>;

    fn release_rows(&mut self, rows: &[RowHandle]) -> ServiceResult<()>;

    /// Release the rowset. Further calls fail with `CursorClosed`.
    fn close(&mut self) -> ServiceResult<()>;
}

/// Crawl scope rules of one catalog
pub trait CrawlScopeManager: Send + Sync {
    fn included_in_crawl_scope(&self, path: &str) -> ServiceResult<bool>;
}

/// One catalog of the index
pub trait CatalogManager: Send + Sync {
    fn crawl_scope_manager(&self) -> ServiceResult<Arc<dyn CrawlScopeManager>>;
}

/// Index administration root
pub trait SearchManager: Send + Sync {
    fn catalog(&self, name: &str) -> ServiceResult<Arc<dyn CatalogManager>>;
}

/// Something that can hand out both administration and query services
pub trait SearchBackend: Send + Sync {
    fn search_manager(&self) -> ServiceResult<Arc<dyn SearchManager>>;
    fn query_service(&self) -> ServiceResult<Arc<dyn QueryService>>;
}

/// Normalize path separators to forward slashes
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
