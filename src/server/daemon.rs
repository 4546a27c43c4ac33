//! Unix index server daemon
//!
//! Keeps a crawled index in memory and serves the cursor protocol over a Unix
//! socket. Cursors belong to the connection that opened them and are closed
//! when it disconnects.

use crate::error::{ServiceError, ServiceResult};
use crate::server::protocol::{Request, Response, StatusResponse, read_message, write_message};
use crate::server::{get_pid_path, get_socket_path};
use crate::service::{MemoryIndex, QueryService, Rowset, SearchBackend};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Connection timeout
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Statistics for the server
struct ServerStats {
    start_time: Instant,
    queries_served: AtomicU64,
    connections: AtomicU64,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            queries_served: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        }
    }
}

/// Cursors opened over one connection
#[derive(Default)]
struct ConnectionCursors {
    next_id: u64,
    open: HashMap<u64, Box<dyn Rowset>>,
}

impl ConnectionCursors {
    fn get(&self, cursor: u64) -> ServiceResult<&dyn Rowset> {
        self.open
            .get(&cursor)
            .map(|rowset| rowset.as_ref())
            .ok_or(ServiceError::CursorClosed)
    }

    fn get_mut(&mut self, cursor: u64) -> ServiceResult<&mut Box<dyn Rowset>> {
        self.open.get_mut(&cursor).ok_or(ServiceError::CursorClosed)
    }

    fn close_all(&mut self) {
        for (id, mut rowset) in self.open.drain() {
            if let Err(e) = rowset.close() {
                log::warn!("failed to close cursor {} on disconnect: {}", id, e);
            }
        }
    }
}

/// The index server daemon
pub struct IndexServer {
    index: Arc<MemoryIndex>,
    socket_path: PathBuf,
    /// Server statistics
    stats: ServerStats,
    /// Shutdown flag
    shutdown: AtomicBool,
}

impl IndexServer {
    /// Server for `index` on the default socket path
    pub fn new(index: Arc<MemoryIndex>) -> Arc<Self> {
        Self::with_socket(index, get_socket_path())
    }

    pub fn with_socket(index: Arc<MemoryIndex>, socket_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            index,
            socket_path: socket_path.into(),
            stats: ServerStats::new(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one, readable by the user only
    pub fn bind(&self) -> Result<UnixListener> {
        let socket_path = &self.socket_path;

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Remove stale socket file
        if socket_path.exists() {
            fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind to {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(listener)
    }

    /// Bind, write the PID file and serve until shutdown (blocking)
    pub fn run(self: &Arc<Self>) -> Result<()> {
        let pid_path = get_pid_path();
        let listener = self.bind()?;
        fs::write(&pid_path, format!("{}", std::process::id()))
            .with_context(|| format!("Failed to write {}", pid_path.display()))?;

        let result = self.serve(listener);
        let _ = fs::remove_file(&pid_path);
        result
    }

    /// Accept connections until a client asks for shutdown
    pub fn serve(self: &Arc<Self>, listener: UnixListener) -> Result<()> {
        log::info!(
            "listening on {} ({} items)",
            self.socket_path.display(),
            self.index.len()
        );

        for stream in listener.incoming() {
            if !self.accept(stream) {
                break;
            }
        }

        let _ = fs::remove_file(&self.socket_path);
        log::info!("server stopped");
        Ok(())
    }

    /// Dispatch one accepted stream to its own thread. Returns false once
    /// shutdown was requested; the stream that woke the loop is dropped uncounted.
    fn accept(self: &Arc<Self>, stream: std::io::Result<UnixStream>) -> bool {
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }

        match stream {
            Ok(stream) => {
                // no read timeout: a priming cursor may sit idle between keystrokes
                let _ = stream.set_write_timeout(Some(CONNECTION_TIMEOUT));
                self.stats.connections.fetch_add(1, Ordering::Relaxed);

                let server = Arc::clone(self);
                thread::spawn(move || {
                    if let Err(e) = server.handle_connection(stream) {
                        log::warn!("connection error: {:#}", e);
                    }
                });
            }
            Err(e) => {
                log::warn!("accept error: {}", e);
            }
        }
        true
    }

    /// Handle a single client connection
    fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);
        let mut cursors = ConnectionCursors::default();

        let result = self.connection_loop(&mut reader, &mut writer, &mut cursors);
        cursors.close_all();
        result
    }

    fn connection_loop(
        &self,
        reader: &mut BufReader<UnixStream>,
        writer: &mut BufWriter<UnixStream>,
        cursors: &mut ConnectionCursors,
    ) -> Result<()> {
        loop {
            let request: Request = match read_message(reader) {
                Ok(req) => req,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Client disconnected
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    let resp = Response::Error {
                        message: format!("Invalid request: {}", e),
                    };
                    write_message(writer, &resp)?;
                    continue;
                }
                Err(e) => return Err(e).context("reading request"),
            };

            let response = self
                .handle_request(request, cursors)
                .unwrap_or_else(|e| Response::Error {
                    message: e.to_string(),
                });

            write_message(writer, &response)?;

            if matches!(response, Response::ShuttingDown) {
                // unblock the accept loop so it sees the flag
                let _ = UnixStream::connect(&self.socket_path);
                break;
            }
        }

        Ok(())
    }

    /// Handle a single request
    fn handle_request(
        &self,
        request: Request,
        cursors: &mut ConnectionCursors,
    ) -> ServiceResult<Response> {
        match request {
            Request::Execute { sql } => self.handle_execute(&sql, cursors),

            Request::WhereId { cursor } => Ok(Response::WhereId {
                id: cursors.get(cursor)?.where_id()?,
            }),

            Request::FetchRows { cursor, max } => Ok(Response::Rows {
                rows: cursors.get_mut(cursor)?.next_rows(max)?,
            }),

            Request::RowProperties { cursor, row } => Ok(Response::Properties {
                properties: cursors.get(cursor)?.row_properties(row)?,
            }),

            Request::ReleaseRows { cursor, rows } => {
                cursors.get_mut(cursor)?.release_rows(&rows)?;
                Ok(Response::Released)
            }

            Request::CloseCursor { cursor } => {
                let mut rowset = cursors.open.remove(&cursor).ok_or(ServiceError::CursorClosed)?;
                rowset.close()?;
                Ok(Response::Closed)
            }

            Request::IncludedInCrawlScope { catalog, path } => {
                let included = self
                    .index
                    .search_manager()?
                    .catalog(&catalog)?
                    .crawl_scope_manager()?
                    .included_in_crawl_scope(&path)?;
                Ok(Response::Included { included })
            }

            Request::Status => Ok(self.handle_status()),

            Request::Shutdown => {
                log::info!("shutdown requested");
                self.shutdown.store(true, Ordering::Release);
                Ok(Response::ShuttingDown)
            }

            Request::Ping => Ok(Response::Pong),
        }
    }

    fn handle_execute(&self, sql: &str, cursors: &mut ConnectionCursors) -> ServiceResult<Response> {
        let start = Instant::now();

        let mut command = self.index.connect()?.create_command()?;
        command.set_text(sql)?;
        let execution = command.execute()?;

        let cursor = cursors.next_id;
        cursors.next_id += 1;
        cursors.open.insert(cursor, execution.rowset);
        self.stats.queries_served.fetch_add(1, Ordering::Relaxed);

        log::debug!(
            "cursor {} opened in {:.2}ms: {}",
            cursor,
            start.elapsed().as_secs_f64() * 1000.0,
            sql
        );

        Ok(Response::Executed {
            cursor,
            row_count: execution.row_count,
        })
    }

    fn handle_status(&self) -> Response {
        Response::Status(StatusResponse {
            uptime_secs: self.stats.start_time.elapsed().as_secs(),
            items: self.index.len(),
            crawl_roots: self.index.crawl_roots().to_vec(),
            queries_served: self.stats.queries_served.load(Ordering::Relaxed),
            open_cursors: self.index.stats().open_cursors as u64,
            connections: self.stats.connections.load(Ordering::Relaxed),
        })
    }
}

/// Start the daemon in foreground
pub fn run_foreground(index: Arc<MemoryIndex>) -> Result<()> {
    let server = IndexServer::new(index);
    server.run()
}

/// Stop the running daemon
pub fn stop_daemon() -> Result<bool> {
    let pid_path = get_pid_path();

    if !pid_path.exists() {
        return Ok(false);
    }

    let pid_str = fs::read_to_string(&pid_path)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .with_context(|| format!("Malformed PID file {}", pid_path.display()))?;

    // Send SIGTERM
    unsafe {
        if libc::kill(pid, libc::SIGTERM) == 0 {
            // Wait a bit for graceful shutdown
            thread::sleep(Duration::from_millis(500));

            if libc::kill(pid, 0) == 0 {
                thread::sleep(Duration::from_secs(1));
                if libc::kill(pid, 0) == 0 {
                    libc::kill(pid, libc::SIGKILL);
                }
            }
        }
    }

    // Clean up socket and pid files
    let _ = fs::remove_file(get_socket_path());
    let _ = fs::remove_file(&pid_path);

    Ok(true)
}
