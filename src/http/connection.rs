use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::parser::{MAX_CONTENT_LENGTH, MAX_HEAD_BYTES, ParseError, RequestParser};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::pool::BufferLease;
use crate::server::router;
use crate::server::state::AppState;

/// Upper bound on bytes buffered for one request, chunk framing included.
const MAX_BUFFERED: usize = MAX_HEAD_BYTES + 2 * MAX_CONTENT_LENGTH;

/// One client connection, served request by request in arrival order.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    app: Arc<AppState>,
    /// Receive buffer leased from the pool for the life of the connection
    buffer: Option<BufferLease>,
    state: ConnectionState,
    served: usize,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    /// A response to send. The flag is the keep-alive decision; the lease is
    /// the pooled buffer backing the writer, if one was available.
    Writing(ResponseWriter, bool, Option<BufferLease>),
    Closed,
}

enum ReadOutcome {
    Request(Request),
    Rejected(ParseError),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, app: Arc<AppState>) -> Self {
        Self {
            stream,
            peer,
            app,
            buffer: None,
            state: ConnectionState::Reading,
            served: 0,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        match self.app.pool.get() {
            Ok(lease) => self.buffer = Some(lease),
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "No receive buffer, dropping connection");
                return Ok(());
            }
        }

        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);
            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    ReadOutcome::Request(req) => {
                        self.served += 1;
                        ConnectionState::Processing(req)
                    }
                    ReadOutcome::Rejected(e) => {
                        tracing::warn!(peer = %self.peer, error = %e, "Rejecting malformed request");
                        let response = match e {
                            ParseError::MethodNotAllowed(_) => Response::method_not_allowed(),
                            _ => Response::error(e.status()),
                        };
                        self.writing(&response, false)
                    }
                    ReadOutcome::Closed => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let (req, response) = self.dispatch(req).await?;
                    let keep_alive = req.keep_alive()
                        && !response.wants_close()
                        && self.served < self.app.config.server.max_requests_per_connection;

                    tracing::debug!(
                        peer = %self.peer,
                        method = req.method.as_str(),
                        path = req.path(),
                        status = response.status.as_u16(),
                        keep_alive,
                        "Request handled"
                    );
                    self.writing(&response, keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive, lease) => {
                    let result = writer.write_to_stream(&mut self.stream).await;

                    if let Some(mut lease) = lease {
                        *lease = writer.into_buffer();
                        if let Err(e) = self.app.pool.release(lease) {
                            tracing::warn!(error = %e, "Send buffer not returned to pool");
                        }
                    }
                    result?;

                    if keep_alive {
                        ConnectionState::Reading
                    } else {
                        self.close().await;
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    /// Routes `req` on the blocking pool, since service handlers may wait on
    /// locks, storage or the driver.
    async fn dispatch(&self, req: Request) -> anyhow::Result<(Request, Response)> {
        let app = Arc::clone(&self.app);
        let peer = self.peer;
        let handled = tokio::task::spawn_blocking(move || {
            let response = router::route(&app, &req, peer);
            (req, response)
        })
        .await;

        match handled {
            Ok(handled) => Ok(handled),
            Err(e) if e.is_panic() => {
                tracing::error!(peer = %self.peer, error = %e, "Request handler panicked");
                anyhow::bail!("request handler panicked")
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialises `response` into a pooled send buffer, or a fresh one when
    /// the pool is exhausted.
    fn writing(&self, response: &Response, keep_alive: bool) -> ConnectionState {
        let mut lease = self.app.pool.get().ok();
        let buffer = match lease.as_mut() {
            Some(lease) => std::mem::take(&mut **lease),
            None => {
                tracing::debug!(peer = %self.peer, "Pool exhausted, allocating send buffer");
                BytesMut::new()
            }
        };
        let writer = ResponseWriter::with_buffer(response, keep_alive, buffer);
        ConnectionState::Writing(writer, keep_alive, lease)
    }

    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        let idle_timeout = self.app.config.server.idle_timeout();
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(ReadOutcome::Closed);
        };
        let buffer: &mut BytesMut = buffer;

        // fresh per request; resumes across partial reads
        let mut parser = RequestParser::new();

        loop {
            if !buffer.is_empty() {
                match parser.parse(buffer) {
                    Ok((request, consumed)) => {
                        buffer.advance(consumed);
                        return Ok(ReadOutcome::Request(request));
                    }
                    Err(ParseError::Incomplete) => {}
                    Err(e) => return Ok(ReadOutcome::Rejected(e)),
                }
            }

            if buffer.len() >= MAX_BUFFERED {
                return Ok(ReadOutcome::Rejected(ParseError::LengthExceeded("request")));
            }

            // the idle deadline restarts with every read
            let read = tokio::time::timeout(idle_timeout, self.stream.read_buf(&mut *buffer)).await;
            match read {
                Err(_) => {
                    tracing::debug!(peer = %self.peer, "Idle timeout, closing connection");
                    self.close().await;
                    return Ok(ReadOutcome::Closed);
                }
                Ok(Ok(0)) => {
                    if !buffer.is_empty() {
                        tracing::debug!(peer = %self.peer, pending = buffer.len(), "Peer closed mid-request");
                    }
                    return Ok(ReadOutcome::Closed);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Flushes anything pending and shuts the write side down.
    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        if let Some(lease) = self.buffer.take() {
            if let Err(e) = self.app.pool.release(lease) {
                tracing::debug!(error = %e, "Receive buffer not returned to pool");
            }
        }
    }
}
