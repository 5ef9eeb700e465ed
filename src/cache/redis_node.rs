//! Redis Node
//!
//! Blocking Redis connection behind the [`Node`] trait. The connection is
//! opened on first use and dropped after any connectivity failure, so the
//! next operation reconnects on its own.
//!
//! The same timeout bounds connecting and every read and write on the
//! socket, so a server that accepts but never answers fails the call as
//! unreachable instead of blocking it.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use redis::{Client, Cmd, Connection, FromRedisValue, RedisError};
use tracing::debug;

use super::node::{Node, NodeError, NodeResult, WriteOptions};

/// Default connect and I/O timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Redis-backed cache node
pub struct RedisNode {
    id: String,
    client: Client,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl RedisNode {
    /// Create a node for `url` (`redis://host:port/db`)
    ///
    /// Only validates the URL; no connection is made until the first
    /// operation.
    pub fn open(url: &str) -> NodeResult<Self> {
        Self::with_timeout(url, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a node with a custom connect and I/O timeout
    pub fn with_timeout(url: &str, timeout: Duration) -> NodeResult<Self> {
        let client = Client::open(url).map_err(|e| NodeError::backend(format!("{url}: {e}")))?;
        Ok(Self {
            id: url.to_string(),
            client,
            timeout,
            connection: Mutex::new(None),
        })
    }

    fn classify(&self, err: RedisError) -> NodeError {
        if err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_io_error()
            || err.is_timeout()
        {
            NodeError::connectivity(&self.id, err.to_string())
        } else {
            NodeError::backend(err.to_string())
        }
    }

    fn connect(&self) -> NodeResult<Connection> {
        let conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| self.classify(e))?;
        conn.set_read_timeout(Some(self.timeout))
            .map_err(|e| self.classify(e))?;
        conn.set_write_timeout(Some(self.timeout))
            .map_err(|e| self.classify(e))?;
        Ok(conn)
    }

    fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> NodeResult<T> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            debug!(node = %self.id, "Opening redis connection");
            *guard = Some(self.connect()?);
        }

        let Some(conn) = guard.as_mut() else {
            return Err(NodeError::connectivity(&self.id, "no connection"));
        };
        cmd.query(conn).map_err(|e| {
            let err = self.classify(e);
            if err.is_connectivity() {
                *guard = None;
            }
            err
        })
    }

    fn set_cmd(key: &str, value: &[u8], opts: &WriteOptions, only_if_absent: bool) -> Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = opts.ttl {
            // PX 0 is rejected by redis
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        if only_if_absent {
            cmd.arg("NX");
        }
        cmd
    }
}

impl fmt::Debug for RedisNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisNode")
            .field("id", &self.id)
            .field("connected", &self.connection.lock().is_some())
            .finish()
    }
}

impl Node for RedisNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> NodeResult<Option<Bytes>> {
        let value: Option<Vec<u8>> = self.query(redis::cmd("GET").arg(key))?;
        Ok(value.map(Bytes::from))
    }

    fn set(&self, key: &str, value: Bytes, opts: &WriteOptions) -> NodeResult<bool> {
        let reply: Option<String> = self.query(&Self::set_cmd(key, &value, opts, false))?;
        Ok(reply.is_some())
    }

    fn set_if_absent(&self, key: &str, value: Bytes, opts: &WriteOptions) -> NodeResult<bool> {
        // nil reply means the key already existed
        let reply: Option<String> = self.query(&Self::set_cmd(key, &value, opts, true))?;
        Ok(reply.is_some())
    }

    fn delete(&self, key: &str) -> NodeResult<bool> {
        let removed: i64 = self.query(redis::cmd("DEL").arg(key))?;
        Ok(removed > 0)
    }

    fn expires_natively(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_does_not_connect() {
        let node = RedisNode::open("redis://127.0.0.1:6379/0").unwrap();
        assert_eq!(node.id(), "redis://127.0.0.1:6379/0");
        assert!(node.connection.lock().is_none());
    }

    #[test]
    fn test_invalid_url_is_backend_error() {
        let err = RedisNode::open("not a url").unwrap_err();
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_unreachable_server_is_connectivity() {
        // port 1 on localhost has nothing listening
        let node =
            RedisNode::with_timeout("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        let err = node.get("k").unwrap_err();
        assert!(err.is_connectivity(), "unexpected: {err}");
        assert!(node.connection.lock().is_none());
    }

    #[test]
    fn test_silent_server_times_out() {
        use std::net::TcpListener;
        use std::sync::mpsc;
        use std::time::Instant;

        // accepts connections and never writes a reply
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => held.push(stream),
                    Err(_) => break,
                }
            }
        });

        let url = format!("redis://{addr}/");
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let node = RedisNode::with_timeout(&url, Duration::from_millis(200)).unwrap();
            let started = Instant::now();
            let result = node.get("k");
            let _ = tx.send((result, started.elapsed(), node.connection.lock().is_none()));
        });

        let (result, elapsed, dropped) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("get blocked on a silent server");
        let err = result.unwrap_err();
        assert!(err.is_connectivity(), "unexpected: {err}");
        assert!(elapsed < Duration::from_secs(2));
        assert!(dropped);
    }

    #[test]
    fn test_set_command_arguments() {
        let opts = WriteOptions::with_ttl(Some(Duration::from_secs(2)));
        let packed =
            String::from_utf8(RedisNode::set_cmd("k", b"v", &opts, true).get_packed_command())
                .unwrap();
        assert!(packed.contains("PX"));
        assert!(packed.contains("2000"));
        assert!(packed.contains("NX"));
    }
}
