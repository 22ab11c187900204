//! One-shot control channel client.
//!
//! Every call opens a fresh connection, writes one command, reads one
//! response and closes. Kea handles control commands serially and closes the
//! socket after answering, so there is nothing to gain from keeping it open.

use std::{io, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, UnixStream},
};
use tracing::{debug, trace};

use config::{ServerSource, Transport};

use crate::error::{ChannelError, ChannelResult};
use crate::models::{StatQuery, StatResponse};
use crate::protocol;

/// Default timeout for one command exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default upper bound on a response. Kea keeps 20 samples per statistic,
/// a daemon with a few thousand subnets answers with tens of megabytes.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 128 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Talks to a single [`ServerSource`].
#[derive(Debug, Clone)]
pub struct ControlClient {
    source: Arc<ServerSource>,
    timeout: Duration,
    max_response_size: usize,
    http: Option<reqwest::Client>,
}

impl ControlClient {
    /// Create a client for `source`. Nothing is connected until [`fetch`](Self::fetch).
    pub fn new(source: Arc<ServerSource>, timeout: Duration) -> ChannelResult<Self> {
        let http = match source.address() {
            Transport::Http(_) => Some(
                reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| {
                        ChannelError::Unreachable(format!("failed to build http client: {e}"))
                    })?,
            ),
            _ => None,
        };
        Ok(Self {
            source,
            timeout,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            http,
        })
    }

    /// Reject responses larger than `size` bytes.
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    pub fn source(&self) -> &Arc<ServerSource> {
        &self.source
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_response_size(&self) -> usize {
        self.max_response_size
    }

    /// Send `query` and wait for the response, bounded by the client timeout.
    pub async fn fetch(&self, query: &StatQuery) -> ChannelResult<StatResponse> {
        let limit = self.max_response_size;
        let work = async {
            let bytes = match self.source.address() {
                Transport::Unix(path) => {
                    let stream = UnixStream::connect(path)
                        .await
                        .map_err(|e| unreachable("connect", e))?;
                    exchange(stream, &query.direct(), limit).await?
                }
                Transport::Tcp(addr) => {
                    let stream = TcpStream::connect(addr.as_str())
                        .await
                        .map_err(|e| unreachable("connect", e))?;
                    exchange(stream, &query.direct(), limit).await?
                }
                Transport::Http(url) => self.post(url, query).await?,
            };
            trace!(len = bytes.len(), "received control channel response");
            protocol::parse_response(&bytes)
        };

        match tokio::time::timeout(self.timeout, work).await {
            Ok(res) => res,
            Err(_) => {
                debug!(server = %self.source.identity(), timeout = ?self.timeout, "control channel timed out");
                Err(ChannelError::Timeout(format!(
                    "no response from {} after {:?}",
                    self.source.address(),
                    self.timeout
                )))
            }
        }
    }

    async fn post(&self, url: &str, query: &StatQuery) -> ChannelResult<Vec<u8>> {
        let limit = self.max_response_size;
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| ChannelError::Unreachable("http client not initialized".into()))?;
        let mut resp = http
            .post(url)
            .json(query)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = resp.status();
        if resp.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large(limit));
        }
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(map_reqwest)? {
            if body.len() + chunk.len() > limit {
                return Err(too_large(limit));
            }
            body.extend_from_slice(&chunk);
        }
        if !status.is_success() && body.is_empty() {
            return Err(ChannelError::Protocol(format!("http status {status}")));
        }
        Ok(body)
    }
}

/// Write one command and read until a complete JSON document has arrived or
/// the peer closes the connection. Anything after the document is dropped.
async fn exchange<S>(mut stream: S, query: &StatQuery, limit: usize) -> ChannelResult<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = query.to_bytes()?;
    stream
        .write_all(&req)
        .await
        .map_err(|e| unreachable("write", e))?;
    stream.flush().await.map_err(|e| unreachable("write", e))?;

    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut framer = Framer::default();
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| unreachable("read", e))?;
        if n == 0 {
            if buf.is_empty() {
                return Err(ChannelError::Unreachable(
                    "connection closed without a response".into(),
                ));
            }
            // whatever arrived is all there is, let the parser judge it
            return Ok(buf);
        }
        if buf.len() + n > limit {
            return Err(too_large(limit));
        }
        let end = framer.feed(&chunk[..n])?;
        match end {
            Some(end) => {
                buf.extend_from_slice(&chunk[..end]);
                return Ok(buf);
            }
            None => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Tracks nesting of the top-level JSON value across reads, so each byte is
/// looked at once. Brackets inside strings are skipped; whether the document
/// is actually valid is left to the parser.
#[derive(Debug, Default)]
struct Framer {
    depth: usize,
    started: bool,
    in_string: bool,
    escaped: bool,
}

impl Framer {
    /// Feed the next chunk. Returns the offset just past the closing bracket
    /// once the top-level value is complete.
    fn feed(&mut self, chunk: &[u8]) -> ChannelResult<Option<usize>> {
        for (idx, &b) in chunk.iter().enumerate() {
            if self.in_string {
                match b {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'{' | b'[' => {
                    self.started = true;
                    self.depth += 1;
                }
                b'}' | b']' => {
                    if self.depth == 0 {
                        return Err(ChannelError::Protocol(
                            "response is not valid JSON: unbalanced brackets".into(),
                        ));
                    }
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Ok(Some(idx + 1));
                    }
                }
                b' ' | b'\t' | b'\n' | b'\r' => {}
                _ if !self.started => {
                    return Err(ChannelError::Protocol(
                        "response is not a JSON object or array".into(),
                    ));
                }
                b'"' => self.in_string = true,
                _ => {}
            }
        }
        Ok(None)
    }
}

fn too_large(limit: usize) -> ChannelError {
    ChannelError::Protocol(format!("response exceeds {limit} bytes"))
}

fn unreachable(op: &str, err: io::Error) -> ChannelError {
    ChannelError::Unreachable(format!("{op} failed: {err}"))
}

fn map_reqwest(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        ChannelError::Timeout(err.to_string())
    } else if err.is_decode() || err.is_body() {
        ChannelError::Protocol(err.to_string())
    } else {
        ChannelError::Unreachable(err.to_string())
    }
}
