//! Client side of the index server: a [`SearchBackend`] over a Unix socket
//!
//! Every `connect()` opens its own socket. The rowset produced by a command
//! keeps that socket, so a cursor lives exactly as long as its
//! `ResultCursor` and the server frees it when the socket goes away.

use crate::error::{ServiceError, ServiceResult};
use crate::server::get_socket_path;
use crate::server::protocol::{Request, Response, StatusResponse, read_message, write_message};
use crate::service::{
    CatalogManager, Command, Connection, CrawlScopeManager, Execution, PropertyBag, QueryService,
    RowHandle, Rowset, SearchBackend, SearchManager,
};
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// One socket to the daemon
struct Channel {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
}

impl Channel {
    fn open(socket_path: &Path) -> ServiceResult<Self> {
        let stream = UnixStream::connect(socket_path)?;

        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);

        Ok(Self { reader, writer })
    }

    /// Send one request and read its response; server errors become `Err`
    fn request(&mut self, request: &Request) -> ServiceResult<Response> {
        write_message(&mut self.writer, request)?;

        match read_message(&mut self.reader)? {
            Response::Error { message } => Err(ServiceError::Server(message)),
            response => Ok(response),
        }
    }
}

type SharedChannel = Arc<Mutex<Channel>>;

fn call(channel: &SharedChannel, request: &Request) -> ServiceResult<Response> {
    channel
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .request(request)
}

/// Backend talking to a running `searchprime daemon`
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    socket_path: PathBuf,
}

impl RemoteBackend {
    pub fn new(socket_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            socket_path: socket_path.into(),
        })
    }

    /// Backend for the daemon at the default socket path
    pub fn local() -> Arc<Self> {
        Self::new(get_socket_path())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn oneshot(&self, request: &Request) -> ServiceResult<Response> {
        Channel::open(&self.socket_path)?.request(request)
    }

    /// Ping the server
    pub fn ping(&self) -> ServiceResult<()> {
        match self.oneshot(&Request::Ping)? {
            Response::Pong => Ok(()),
            _ => Err(ServiceError::InvalidResponse),
        }
    }

    /// Get server status
    pub fn status(&self) -> ServiceResult<StatusResponse> {
        match self.oneshot(&Request::Status)? {
            Response::Status(status) => Ok(status),
            _ => Err(ServiceError::InvalidResponse),
        }
    }

    /// Request graceful shutdown
    pub fn shutdown(&self) -> ServiceResult<()> {
        match self.oneshot(&Request::Shutdown)? {
            Response::ShuttingDown => Ok(()),
            _ => Err(ServiceError::InvalidResponse),
        }
    }
}

impl SearchBackend for RemoteBackend {
    fn search_manager(&self) -> ServiceResult<Arc<dyn SearchManager>> {
        // fail here rather than on the first scope check
        self.ping()?;
        Ok(Arc::new(RemoteSearchManager {
            socket_path: self.socket_path.clone(),
        }))
    }

    fn query_service(&self) -> ServiceResult<Arc<dyn QueryService>> {
        Ok(Arc::new(self.clone()))
    }
}

impl QueryService for RemoteBackend {
    fn connect(&self) -> ServiceResult<Box<dyn Connection>> {
        let channel = Channel::open(&self.socket_path)?;
        Ok(Box::new(RemoteConnection {
            channel: Arc::new(Mutex::new(channel)),
        }))
    }
}

struct RemoteConnection {
    channel: SharedChannel,
}

impl Connection for RemoteConnection {
    fn create_command(&mut self) -> ServiceResult<Box<dyn Command>> {
        Ok(Box::new(RemoteCommand {
            channel: Arc::clone(&self.channel),
            text: None,
        }))
    }
}

struct RemoteCommand {
    channel: SharedChannel,
    text: Option<String>,
}

impl Command for RemoteCommand {
    fn set_text(&mut self, sql: &str) -> ServiceResult<()> {
        self.text = Some(sql.to_string());
        Ok(())
    }

    fn execute(&mut self) -> ServiceResult<Execution> {
        let sql = self.text.clone().ok_or(ServiceError::NoCommandText)?;

        match call(&self.channel, &Request::Execute { sql })? {
            Response::Executed { cursor, row_count } => Ok(Execution {
                rowset: Box::new(RemoteRowset {
                    channel: Arc::clone(&self.channel),
                    cursor,
                    closed: false,
                }),
                row_count,
            }),
            _ => Err(ServiceError::InvalidResponse),
        }
    }
}

struct RemoteRowset {
    channel: SharedChannel,
    cursor: u64,
    closed: bool,
}

impl RemoteRowset {
    fn call(&self, request: &Request) -> ServiceResult<Response> {
        if self.closed {
            return Err(ServiceError::CursorClosed);
        }
        call(&self.channel, request)
    }
}

impl Rowset for RemoteRowset {
    fn where_id(&self) -> ServiceResult<Option<u32>> {
        match self.call(&Request::WhereId {
            cursor: self.cursor,
        })? {
            Response::WhereId { id } => Ok(id),
            _ => Err(ServiceError::InvalidResponse),
        }
    }

    fn next_rows(&mut self, max: usize) -> ServiceResult<Vec<RowHandle>> {
        match self.call(&Request::FetchRows {
            cursor: self.cursor,
            max,
        })? {
            Response::Rows { rows } => Ok(rows),
            _ => Err(ServiceError::InvalidResponse),
        }
    }

    fn row_properties(&self, row: RowHandle) -> ServiceResult<PropertyBag> {
        match self.call(&Request::RowProperties {
            cursor: self.cursor,
            row,
        })? {
            Response::Properties { properties } => Ok(properties),
            _ => Err(ServiceError::InvalidResponse),
        }
    }

    fn release_rows(&mut self, rows: &[RowHandle]) -> ServiceResult<()> {
        match self.call(&Request::ReleaseRows {
            cursor: self.cursor,
            rows: rows.to_vec(),
        })? {
            Response::Released => Ok(()),
            _ => Err(ServiceError::InvalidResponse),
        }
    }

    fn close(&mut self) -> ServiceResult<()> {
        let response = self.call(&Request::CloseCursor {
            cursor: self.cursor,
        })?;
        self.closed = true;
        match response {
            Response::Closed => Ok(()),
            _ => Err(ServiceError::InvalidResponse),
        }
    }
}

struct RemoteSearchManager {
    socket_path: PathBuf,
}

impl SearchManager for RemoteSearchManager {
    fn catalog(&self, name: &str) -> ServiceResult<Arc<dyn CatalogManager>> {
        Ok(Arc::new(RemoteCatalog {
            socket_path: self.socket_path.clone(),
            name: name.to_string(),
        }))
    }
}

struct RemoteCatalog {
    socket_path: PathBuf,
    name: String,
}

impl CatalogManager for RemoteCatalog {
    fn crawl_scope_manager(&self) -> ServiceResult<Arc<dyn CrawlScopeManager>> {
        Ok(Arc::new(RemoteCrawlScope {
            socket_path: self.socket_path.clone(),
            catalog: self.name.clone(),
        }))
    }
}

struct RemoteCrawlScope {
    socket_path: PathBuf,
    catalog: String,
}

impl CrawlScopeManager for RemoteCrawlScope {
    fn included_in_crawl_scope(&self, path: &str) -> ServiceResult<bool> {
        let request = Request::IncludedInCrawlScope {
            catalog: self.catalog.clone(),
            path: path.to_string(),
        };
        match Channel::open(&self.socket_path)?.request(&request)? {
            Response::Included { included } => Ok(included),
            _ => Err(ServiceError::InvalidResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_when_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RemoteBackend::new(dir.path().join("missing.sock"));

        assert!(matches!(backend.connect(), Err(ServiceError::Io(_))));
        assert!(backend.ping().is_err());
        assert!(backend.search_manager().is_err());
        // the query service handle itself is lazy
        assert!(backend.query_service().is_ok());
    }
}
