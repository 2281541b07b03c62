use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Headers the writer sets itself; handler-supplied copies are ignored.
const FRAMING_HEADERS: [&str; 3] = ["Content-Length", "Connection", "Transfer-Encoding"];

/// Renders `resp` into `buf`.
///
/// The status line uses the canonical reason phrase, `Content-Length` is
/// always derived from the body and `Connection` reflects `keep_alive`.
pub fn serialize_response(resp: &Response, keep_alive: bool, buf: &mut BytesMut) {
    buf.reserve(256 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.put_slice(status_line.as_bytes());

    // Headers, sorted so the output is stable
    let mut headers: Vec<(&String, &String)> = resp
        .headers
        .iter()
        .filter(|(k, _)| !FRAMING_HEADERS.iter().any(|f| k.eq_ignore_ascii_case(f)))
        .collect();
    headers.sort();

    for (k, v) in headers {
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(format!("Content-Length: {}\r\n", resp.body.len()).as_bytes());
    buf.put_slice(if keep_alive {
        b"Connection: keep-alive\r\n".as_slice()
    } else {
        b"Connection: close\r\n".as_slice()
    });

    // Header/body separator
    buf.put_slice(b"\r\n");

    // Body
    buf.put_slice(&resp.body);
}

/// A serialised response plus how much of it has been written.
pub struct ResponseWriter {
    buffer: BytesMut,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response, keep_alive: bool) -> Self {
        Self::with_buffer(response, keep_alive, BytesMut::new())
    }

    /// Serialises into a caller-provided (typically pooled) buffer.
    pub fn with_buffer(response: &Response, keep_alive: bool, mut buffer: BytesMut) -> Self {
        buffer.clear();
        serialize_response(response, keep_alive, &mut buffer);
        Self { buffer, written: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Gives the buffer back so a pooled lease can be returned.
    pub fn into_buffer(self) -> BytesMut {
        self.buffer
    }

    /// Writes the remaining bytes and flushes. Any failure aborts the
    /// connection, so partial progress is only kept for diagnostics.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
