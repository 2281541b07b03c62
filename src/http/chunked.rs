//! Incremental decoder for `Transfer-Encoding: chunked` bodies.
//!
//! The decoder is fed the unconsumed tail of the connection buffer and keeps
//! its position between calls, so a body split across TCP segments decodes
//! the same as one delivered in a single read.

use crate::http::parser::{parse_header_line, ParseError, MAX_HEADERS};
use crate::http::request::HeaderMap;

/// Longest chunk-size line (size plus extensions) we are willing to buffer.
const MAX_CHUNK_LINE: usize = 1024;

/// Hex digits beyond this cannot describe a size we would accept anyway.
const MAX_SIZE_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Waiting for `<hex-size>[;ext]CRLF`
    Size,
    /// Inside chunk data, this many bytes left
    Data(usize),
    /// CRLF after chunk data
    DataEnd,
    /// Trailer fields after the last chunk
    Trailer,
    Done,
}

#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: ChunkState,
    /// Maximum decoded body size
    limit: usize,
}

impl ChunkedDecoder {
    pub fn new(limit: usize) -> Self {
        Self {
            state: ChunkState::Size,
            limit,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Decodes as much of `buf` as possible.
    ///
    /// Payload bytes are appended to `body`, trailer fields to `trailers`.
    /// Returns how many bytes of `buf` were consumed; once the terminating
    /// empty line has been read [`is_done`](Self::is_done) turns true.
    pub fn decode(
        &mut self,
        buf: &[u8],
        body: &mut Vec<u8>,
        trailers: &mut HeaderMap,
    ) -> Result<usize, ParseError> {
        let mut pos = 0;

        loop {
            match self.state {
                ChunkState::Size => {
                    let Some(line_len) = find_crlf(&buf[pos..]) else {
                        if buf.len() - pos > MAX_CHUNK_LINE {
                            return Err(ParseError::InvalidChunk);
                        }
                        return Ok(pos);
                    };
                    if line_len > MAX_CHUNK_LINE {
                        return Err(ParseError::InvalidChunk);
                    }

                    let size = parse_chunk_size(&buf[pos..pos + line_len])?;
                    if body.len().saturating_add(size) > self.limit {
                        return Err(ParseError::ContentTooLarge);
                    }

                    pos += line_len + 2;
                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }

                ChunkState::Data(remaining) => {
                    let available = buf.len() - pos;
                    if available == 0 {
                        return Ok(pos);
                    }
                    let take = remaining.min(available);
                    body.extend_from_slice(&buf[pos..pos + take]);
                    pos += take;
                    self.state = if take == remaining {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(remaining - take)
                    };
                }

                ChunkState::DataEnd => {
                    match buf.get(pos..pos + 2) {
                        Some(b"\r\n") => pos += 2,
                        Some(_) => return Err(ParseError::InvalidChunk),
                        None => {
                            // a lone byte that is not '\r' can already be rejected
                            if buf.get(pos).is_some_and(|&b| b != b'\r') {
                                return Err(ParseError::InvalidChunk);
                            }
                            return Ok(pos);
                        }
                    }
                    self.state = ChunkState::Size;
                }

                ChunkState::Trailer => {
                    let Some(line_len) = find_crlf(&buf[pos..]) else {
                        if buf.len() - pos > crate::http::parser::MAX_HEADER_LINE {
                            return Err(ParseError::LengthExceeded("trailer line"));
                        }
                        return Ok(pos);
                    };

                    if line_len == 0 {
                        pos += 2;
                        self.state = ChunkState::Done;
                        continue;
                    }

                    if trailers.len() >= MAX_HEADERS {
                        return Err(ParseError::TooManyHeaders);
                    }
                    let (name, value) = parse_header_line(&buf[pos..pos + line_len])?;
                    trailers.append(name, value);
                    pos += line_len + 2;
                }

                ChunkState::Done => return Ok(pos),
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    // chunk extensions are accepted and ignored
    let size_part = match line.iter().position(|&b| b == b';') {
        Some(i) => &line[..i],
        None => line,
    };
    let digits = trim_bws(size_part);

    if digits.is_empty()
        || digits.len() > MAX_SIZE_DIGITS
        || !digits.iter().all(u8::is_ascii_hexdigit)
    {
        return Err(ParseError::InvalidChunk);
    }

    let digits = std::str::from_utf8(digits).map_err(|_| ParseError::InvalidChunk)?;
    usize::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidChunk)
}

fn trim_bws(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}
