//! Error taxonomy for the priming/reuse protocol

use std::fmt;

/// Result type for core operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Result type for collaborator calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Stage of query execution that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteStage {
    Connect,
    CreateCommand,
    SetText,
    Execute,
}

impl fmt::Display for ExecuteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecuteStage::Connect => "connect",
            ExecuteStage::CreateCommand => "create command",
            ExecuteStage::SetText => "set command text",
            ExecuteStage::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the core operations (prepare, search, count)
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Connecting, building or running a command failed
    #[error("query execution failed at {stage}: {source}")]
    QueryExecutionFailed {
        stage: ExecuteStage,
        #[source]
        source: ServiceError,
    },

    /// The cursor does not expose a reuse id (unsupported, or already closed)
    #[error("reuse token unavailable: {0}")]
    ReuseTokenUnavailable(String),

    /// `search` called before any successful `prepare`
    #[error("search requested before the session was primed")]
    NotPrimed,

    /// A fetch or release of row handles failed
    #[error("row enumeration failed: {0}")]
    EnumerationFailed(#[source] ServiceError),

    /// Crawl scope lookup through the index administration service failed
    #[error("crawl scope check failed: {0}")]
    ScopeCheckFailed(#[source] ServiceError),
}

impl SearchError {
    pub(crate) fn execution(stage: ExecuteStage, source: ServiceError) -> Self {
        SearchError::QueryExecutionFailed { stage, source }
    }
}

/// Errors reported by a query service, administration service or transport
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("invalid response from server")]
    InvalidResponse,

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("reuse id {0} does not name a live cursor")]
    StaleReuseToken(u32),

    #[error("unknown row handle {0}")]
    UnknownRow(u64),

    #[error("cursor is closed")]
    CursorClosed,

    #[error("unknown catalog: {0}")]
    UnknownCatalog(String),

    #[error("command has no text")]
    NoCommandText,
}
