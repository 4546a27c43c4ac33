//! Protocol messages for client-server communication
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message
//!
//! Cursors are identified by a per-connection id handed out by `Execute`.

use crate::service::{PropertyBag, RowHandle};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Largest message either side will accept
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Request from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Compile and run a query, opening a cursor
    Execute { sql: String },

    /// Reuse id of an open cursor
    WhereId { cursor: u64 },

    /// Next batch of row handles (empty when exhausted)
    FetchRows { cursor: u64, max: usize },

    /// Properties of one pinned row
    RowProperties { cursor: u64, row: RowHandle },

    /// Unpin rows
    ReleaseRows { cursor: u64, rows: Vec<RowHandle> },

    CloseCursor { cursor: u64 },

    /// Crawl scope membership through the administration service
    IncludedInCrawlScope { catalog: String, path: String },

    /// Check server health and get stats
    Status,

    /// Graceful shutdown request
    Shutdown,

    /// Ping for connection testing
    Ping,
}

/// Response from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Executed { cursor: u64, row_count: Option<u64> },

    WhereId { id: Option<u32> },

    Rows { rows: Vec<RowHandle> },

    Properties { properties: PropertyBag },

    Released,

    Closed,

    Included { included: bool },

    /// Server status
    Status(StatusResponse),

    /// Shutdown acknowledged
    ShuttingDown,

    /// Pong response
    Pong,

    /// Error response
    Error { message: String },
}

/// Server status response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Items held by the served index
    pub items: usize,
    /// Roots the index was crawled from
    pub crawl_roots: Vec<String>,
    /// Total queries executed
    pub queries_served: u64,
    /// Cursors currently open across all connections
    pub open_cursors: u64,
    /// Connections accepted since start
    pub connections: u64,
}

/// Write a message to a stream with length prefix
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if json.len() > MAX_MESSAGE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let len = json.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read a message from a stream with length prefix
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    serde_json::from_slice(&buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ITEM_URL, PropertyValue};
    use std::io::Cursor;

    #[test]
    fn test_roundtrip_request() {
        let req = Request::ReleaseRows {
            cursor: 3,
            rows: vec![RowHandle(7), RowHandle(8)],
        };

        let mut buf = Vec::new();
        write_message(&mut buf, &req).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: Request = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_roundtrip_properties_response() {
        let mut properties = PropertyBag::new();
        properties.insert(ITEM_URL.to_string(), "file:C:/a.txt".into());
        properties.insert("System.Size".to_string(), PropertyValue::Integer(42));
        let resp = Response::Properties { properties };

        let mut buf = Vec::new();
        write_message(&mut buf, &resp).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded: Response = read_message(&mut cursor).unwrap();
        match decoded {
            Response::Properties { properties } => {
                assert_eq!(properties[ITEM_URL].as_str(), Some("file:C:/a.txt"));
                assert_eq!(properties["System.Size"].as_i64(), Some(42));
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_tagged_wire_format() {
        let json = serde_json::to_string(&Request::Execute {
            sql: "SELECT a FROM b".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"Execute","sql":"SELECT a FROM b"}"#);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buf = ((MAX_MESSAGE_LEN + 1) as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(b"{}");
        let result: std::io::Result<Request> = read_message(&mut Cursor::new(buf));
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_stream() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Request::Ping).unwrap();
        buf.truncate(buf.len() - 1);
        let result: std::io::Result<Request> = read_message(&mut Cursor::new(buf));
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
