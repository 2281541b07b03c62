use std::mem;

use crate::error::Error;
use crate::http::chunked::ChunkedDecoder;
use crate::http::request::{HeaderMap, Method, Request, RequestTarget, Version};
use crate::http::response::StatusCode;

pub const MAX_METHOD_LEN: usize = 15;
pub const MAX_TARGET_LEN: usize = 255;
pub const MAX_VERSION_LEN: usize = 15;
/// 256 KiB
pub const MAX_CONTENT_LENGTH: usize = 262_144;
pub const MAX_HEADER_LINE: usize = 8192;
pub const MAX_HEADERS: usize = 64;
pub const MAX_HEAD_BYTES: usize = 32 * 1024;

/// Body media types a SOAP endpoint accepts.
pub const SOAP_MEDIA_TYPES: [&str; 2] = ["application/soap+xml", "text/xml"];

const KNOWN_CODINGS: [&str; 6] = ["chunked", "gzip", "x-gzip", "deflate", "compress", "identity"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Buffer ends mid-message; read more and call again
    #[error("incomplete request")]
    Incomplete,
    #[error("{0} exceeds maximum length")]
    LengthExceeded(&'static str),
    #[error("malformed request line")]
    InvalidRequest,
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("invalid request target")]
    InvalidTarget,
    #[error("invalid HTTP version")]
    InvalidVersion,
    #[error("malformed header")]
    InvalidHeader,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("missing Host header")]
    MissingHost,
    #[error("multiple Host headers")]
    DuplicateHost,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("body exceeds maximum size")]
    ContentTooLarge,
    #[error("body without a valid Content-Type")]
    MissingContentType,
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("both Content-Length and Transfer-Encoding present")]
    ConflictingFraming,
    #[error("invalid Transfer-Encoding")]
    InvalidTransferEncoding,
    #[error("unsupported transfer coding: {0}")]
    UnsupportedTransferCoding(String),
    #[error("malformed chunked body")]
    InvalidChunk,
}

impl ParseError {
    /// Status code the server answers with when it rejects a message.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::MethodNotAllowed(_) => StatusCode::MethodNotAllowed,
            ParseError::UnsupportedMediaType(_) => StatusCode::UnsupportedMediaType,
            ParseError::UnsupportedTransferCoding(_) => StatusCode::NotImplemented,
            _ => StatusCode::BadRequest,
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::MethodNotAllowed(_)
            | ParseError::UnsupportedMediaType(_)
            | ParseError::UnsupportedTransferCoding(_) => Error::Unsupported(e.to_string()),
            other => Error::ParseFailure(other.to_string()),
        }
    }
}

/// Where the parser is within the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Method,
    RequestTarget,
    Version,
    Headers,
    Body,
    Complete,
}

#[derive(Debug)]
enum BodyKind {
    Empty,
    Length(usize),
    Chunked(ChunkedDecoder),
}

/// Incremental HTTP/1.x request parser.
///
/// Call [`parse`](Self::parse) with the whole buffer received so far. When
/// it returns [`ParseError::Incomplete`] read more bytes, append them and
/// call again with the grown buffer; the parser resumes where it stopped.
/// One parser handles one request.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    pos: usize,
    method: Option<Method>,
    target: Option<RequestTarget>,
    version: Option<Version>,
    headers: HeaderMap,
    body_kind: BodyKind,
    body: Vec<u8>,
    trailers: HeaderMap,
    content_length: Option<usize>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Method,
            pos: 0,
            method: None,
            target: None,
            version: None,
            headers: HeaderMap::new(),
            body_kind: BodyKind::Empty,
            body: Vec::new(),
            trailers: HeaderMap::new(),
            content_length: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes of the buffer consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Advances through `buf`, returning the request and the number of bytes
    /// it occupied once the message is complete.
    pub fn parse(&mut self, buf: &[u8]) -> Result<(Request, usize), ParseError> {
        loop {
            match self.state {
                ParseState::Method => self.parse_method(buf)?,
                ParseState::RequestTarget => self.parse_target(buf)?,
                ParseState::Version => self.parse_version(buf)?,
                ParseState::Headers => self.parse_headers(buf)?,
                ParseState::Body => self.parse_body(buf)?,
                ParseState::Complete => return self.finish(),
            }
        }
    }

    fn parse_method(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        // tolerate empty lines left over from a previous message
        while buf[self.pos..].starts_with(b"\r\n") {
            self.pos += 2;
        }
        if &buf[self.pos..] == b"\r" {
            return Err(ParseError::Incomplete);
        }

        let token = scan_token(buf, self.pos, b' ', MAX_METHOD_LEN, "method")?;
        if token.is_empty() || !token.iter().all(|&b| is_tchar(b)) {
            return Err(ParseError::InvalidRequest);
        }

        // token is all tchar, hence ASCII
        let name = String::from_utf8_lossy(token);
        let method = Method::from_str(&name)
            .ok_or_else(|| ParseError::MethodNotAllowed(name.to_string()))?;

        self.pos += token.len() + 1;
        self.method = Some(method);
        self.state = ParseState::RequestTarget;
        Ok(())
    }

    fn parse_target(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        let token = scan_token(buf, self.pos, b' ', MAX_TARGET_LEN, "request-target")?;
        let raw = std::str::from_utf8(token).map_err(|_| ParseError::InvalidTarget)?;
        let target = RequestTarget::parse(raw).ok_or(ParseError::InvalidTarget)?;

        // asterisk-form only makes sense for OPTIONS, which is never accepted
        if target == RequestTarget::Asterisk {
            return Err(ParseError::InvalidTarget);
        }

        self.pos += token.len() + 1;
        self.target = Some(target);
        self.state = ParseState::Version;
        Ok(())
    }

    fn parse_version(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        let token = scan_token(buf, self.pos, b'\r', MAX_VERSION_LEN, "version")?;
        let lf = self.pos + token.len() + 1;
        match buf.get(lf) {
            Some(b'\n') => {}
            Some(_) => return Err(ParseError::InvalidRequest),
            None => return Err(ParseError::Incomplete),
        }

        let raw = std::str::from_utf8(token).map_err(|_| ParseError::InvalidVersion)?;
        let version = Version::from_str(raw).ok_or(ParseError::InvalidVersion)?;

        self.pos = lf + 1;
        self.version = Some(version);
        self.state = ParseState::Headers;
        Ok(())
    }

    fn parse_headers(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        loop {
            let rest = &buf[self.pos..];
            let Some(line_len) = rest.windows(2).position(|w| w == b"\r\n") else {
                if rest.len() > MAX_HEADER_LINE {
                    return Err(ParseError::LengthExceeded("header line"));
                }
                if buf.len() > MAX_HEAD_BYTES {
                    return Err(ParseError::LengthExceeded("header block"));
                }
                return Err(ParseError::Incomplete);
            };

            if line_len == 0 {
                self.pos += 2;
                self.validate_head()?;
                self.state = ParseState::Body;
                return Ok(());
            }

            if line_len > MAX_HEADER_LINE {
                return Err(ParseError::LengthExceeded("header line"));
            }
            if self.headers.len() >= MAX_HEADERS {
                return Err(ParseError::TooManyHeaders);
            }

            let (name, value) = parse_header_line(&rest[..line_len])?;
            self.headers.append(name, value);
            self.pos += line_len + 2;

            if self.pos > MAX_HEAD_BYTES {
                return Err(ParseError::LengthExceeded("header block"));
            }
        }
    }

    /// Checks run once the empty line ending the header block is seen.
    fn validate_head(&mut self) -> Result<(), ParseError> {
        match self.headers.count("Host") {
            0 => return Err(ParseError::MissingHost),
            1 => {}
            _ => return Err(ParseError::DuplicateHost),
        }
        if self.headers.get("Host").is_some_and(str::is_empty) {
            return Err(ParseError::InvalidHeader);
        }

        let has_length = self.headers.contains("Content-Length");
        let has_coding = self.headers.contains("Transfer-Encoding");
        if has_length && has_coding {
            return Err(ParseError::ConflictingFraming);
        }

        self.body_kind = if has_coding {
            self.transfer_coding()?;
            BodyKind::Chunked(ChunkedDecoder::new(MAX_CONTENT_LENGTH))
        } else if has_length {
            let length = self.declared_length()?;
            self.content_length = Some(length);
            if length == 0 {
                BodyKind::Empty
            } else {
                BodyKind::Length(length)
            }
        } else {
            BodyKind::Empty
        };

        if !matches!(self.body_kind, BodyKind::Empty) {
            self.check_content_type()?;
        }
        Ok(())
    }

    fn declared_length(&self) -> Result<usize, ParseError> {
        let mut declared = None;

        for value in self.headers.get_all("Content-Length") {
            for item in value.split(',').map(str::trim) {
                if item.is_empty() || !item.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ParseError::InvalidContentLength);
                }
                // anything this long is over the limit regardless of value
                let significant = item.trim_start_matches('0');
                if significant.len() > 9 {
                    return Err(ParseError::ContentTooLarge);
                }
                let length: usize = if significant.is_empty() {
                    0
                } else {
                    significant
                        .parse()
                        .map_err(|_| ParseError::InvalidContentLength)?
                };
                match declared {
                    Some(previous) if previous != length => {
                        return Err(ParseError::InvalidContentLength);
                    }
                    _ => declared = Some(length),
                }
            }
        }

        let length = declared.ok_or(ParseError::InvalidContentLength)?;
        if length > MAX_CONTENT_LENGTH {
            return Err(ParseError::ContentTooLarge);
        }
        Ok(length)
    }

    fn transfer_coding(&self) -> Result<(), ParseError> {
        let codings: Vec<String> = self
            .headers
            .get_all("Transfer-Encoding")
            .flat_map(|v| v.split(','))
            .map(|c| c.trim().to_ascii_lowercase())
            .collect();

        if codings.iter().any(String::is_empty) || codings.len() != 1 {
            return Err(ParseError::InvalidTransferEncoding);
        }

        let coding = &codings[0];
        if coding == "chunked" {
            Ok(())
        } else if KNOWN_CODINGS.contains(&coding.as_str()) {
            // a request body must end with chunked framing
            Err(ParseError::InvalidTransferEncoding)
        } else {
            Err(ParseError::UnsupportedTransferCoding(coding.clone()))
        }
    }

    fn check_content_type(&self) -> Result<(), ParseError> {
        if self.headers.count("Content-Type") != 1 {
            return Err(ParseError::MissingContentType);
        }
        let value = self.headers.get("Content-Type").unwrap_or_default();
        let media = value.split(';').next().unwrap_or_default().trim();

        let Some((kind, subtype)) = media.split_once('/') else {
            return Err(ParseError::MissingContentType);
        };
        let well_formed = |part: &str| !part.is_empty() && part.bytes().all(is_tchar);
        if !well_formed(kind) || !well_formed(subtype) {
            return Err(ParseError::MissingContentType);
        }

        let media = media.to_ascii_lowercase();
        if SOAP_MEDIA_TYPES.contains(&media.as_str()) {
            Ok(())
        } else {
            Err(ParseError::UnsupportedMediaType(media))
        }
    }

    fn parse_body(&mut self, buf: &[u8]) -> Result<(), ParseError> {
        match &mut self.body_kind {
            BodyKind::Empty => {}
            BodyKind::Length(length) => {
                let length = *length;
                if buf.len() - self.pos < length {
                    return Err(ParseError::Incomplete);
                }
                self.body = buf[self.pos..self.pos + length].to_vec();
                self.pos += length;
            }
            BodyKind::Chunked(decoder) => {
                let consumed = decoder.decode(&buf[self.pos..], &mut self.body, &mut self.trailers)?;
                self.pos += consumed;
                if !decoder.is_done() {
                    return Err(ParseError::Incomplete);
                }
            }
        }

        self.state = ParseState::Complete;
        Ok(())
    }

    fn finish(&mut self) -> Result<(Request, usize), ParseError> {
        let (Some(method), Some(target), Some(version)) =
            (self.method.take(), self.target.take(), self.version.take())
        else {
            // the request was already handed out
            return Err(ParseError::InvalidRequest);
        };

        let request = Request {
            method,
            target,
            version,
            headers: mem::take(&mut self.headers),
            trailers: mem::take(&mut self.trailers),
            body: mem::take(&mut self.body),
            content_length: self.content_length,
        };
        Ok((request, self.pos))
    }
}

/// Parses a complete request from the start of `buf`.
///
/// Convenience wrapper around a fresh [`RequestParser`].
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    RequestParser::new().parse(buf)
}

/// Returns the token starting at `start` and ending before `delim`.
///
/// Fails early once the token is longer than `max`, even if the delimiter
/// has not arrived yet.
fn scan_token<'a>(
    buf: &'a [u8],
    start: usize,
    delim: u8,
    max: usize,
    field: &'static str,
) -> Result<&'a [u8], ParseError> {
    let rest = &buf[start..];
    let limit = rest.len().min(max + 1);

    for (i, &b) in rest[..limit].iter().enumerate() {
        if b == delim {
            return Ok(&rest[..i]);
        }
        if b == b'\r' || b == b'\n' {
            return Err(ParseError::InvalidRequest);
        }
    }

    if rest.len() > max {
        Err(ParseError::LengthExceeded(field))
    } else {
        Err(ParseError::Incomplete)
    }
}

/// Splits one `name: value` line. Shared with the chunked trailer decoder.
pub(crate) fn parse_header_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(ParseError::InvalidHeader)?;

    let name = &line[..colon];
    // also rejects obs-fold and whitespace before the colon
    if name.is_empty() || !name.iter().all(|&b| is_tchar(b)) {
        return Err(ParseError::InvalidHeader);
    }

    let value = &line[colon + 1..];
    if value.iter().any(|&b| (b < b' ' && b != b'\t') || b == 0x7f) {
        return Err(ParseError::InvalidHeader);
    }
    let value = std::str::from_utf8(value).map_err(|_| ParseError::InvalidHeader)?;

    Ok((
        String::from_utf8_lossy(name).into_owned(),
        value.trim_matches(|c| c == ' ' || c == '\t').to_string(),
    ))
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
